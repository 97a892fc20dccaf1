//! Operator selection input.
//!
//! Selection prompts accept a list of 1-based indices (space or comma
//! separated), the literal `all` (also `todos` or `0`), or blank input to
//! cancel.

use crate::error::CoreError;

/// Parsed selection answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    /// 1-based indices in the order given.
    Indices(Vec<usize>),
    /// Blank input.
    Cancel,
}

/// Parse an operator's selection answer.
pub fn parse_selection(input: &str) -> Result<Selection, CoreError> {
    let trimmed = input.trim().to_lowercase();
    if trimmed.is_empty() {
        return Ok(Selection::Cancel);
    }
    if matches!(trimmed.as_str(), "all" | "todos" | "0") {
        return Ok(Selection::All);
    }

    let indices = trimmed
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<usize>()
                .map_err(|_| CoreError::Parse(format!("'{token}' is not an index")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Selection::Indices(indices))
}

impl Selection {
    /// Resolve the selection against `items`.
    ///
    /// Out-of-range indices are ignored; duplicates keep their first
    /// position. An empty result from an index list is an error so the
    /// caller can tell "nothing valid" from "cancelled".
    pub fn resolve<T: Clone>(&self, items: &[T]) -> Result<Vec<T>, CoreError> {
        match self {
            Selection::Cancel => Ok(Vec::new()),
            Selection::All => Ok(items.to_vec()),
            Selection::Indices(indices) => {
                let mut seen = Vec::with_capacity(indices.len());
                for &idx in indices {
                    if (1..=items.len()).contains(&idx) && !seen.contains(&idx) {
                        seen.push(idx);
                    }
                }
                if seen.is_empty() {
                    return Err(CoreError::Validation("Nothing selected".to_string()));
                }
                Ok(seen.into_iter().map(|idx| items[idx - 1].clone()).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn blank_cancels() {
        assert_eq!(parse_selection("   ").unwrap(), Selection::Cancel);
    }

    #[test]
    fn all_token_and_zero() {
        assert_eq!(parse_selection("ALL").unwrap(), Selection::All);
        assert_eq!(parse_selection("0").unwrap(), Selection::All);
    }

    #[test]
    fn spaces_and_commas() {
        assert_eq!(
            parse_selection("2 3,5").unwrap(),
            Selection::Indices(vec![2, 3, 5])
        );
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert_matches!(parse_selection("2 x"), Err(CoreError::Parse(_)));
    }

    #[test]
    fn resolve_keeps_order_and_drops_out_of_range() {
        let items = ["a", "b", "c"];
        let picked = Selection::Indices(vec![3, 9, 1, 3]).resolve(&items).unwrap();
        assert_eq!(picked, vec!["c", "a"]);
    }

    #[test]
    fn resolve_nothing_valid_is_an_error() {
        let items = ["a"];
        assert!(Selection::Indices(vec![5]).resolve(&items).is_err());
    }

    #[test]
    fn resolve_all_and_cancel() {
        let items = ["a", "b"];
        assert_eq!(Selection::All.resolve(&items).unwrap(), vec!["a", "b"]);
        assert!(Selection::Cancel.resolve(&items).unwrap().is_empty());
    }
}
