/// Runs `apply` over `strategies` in order and returns the first hit.
///
/// The search-result link selectors, the heuristic extraction passes and the
/// domain guess table are all "try these in order until one works" chains;
/// they share this instead of re-rolling the loop each time.
pub fn first_some<S, T>(strategies: &[S], mut apply: impl FnMut(&S) -> Option<T>) -> Option<T> {
    strategies.iter().find_map(|strategy| apply(strategy))
}

#[cfg(test)]
mod tests {
    use super::first_some;

    #[test]
    fn returns_first_non_empty_result() {
        let strategies = ["miss", "hit-a", "hit-b"];
        let result = first_some(&strategies, |s| {
            s.starts_with("hit").then(|| s.to_string())
        });

        assert_eq!(result, Some("hit-a".to_string()));
    }

    #[test]
    fn exhausted_strategies_yield_none() {
        let strategies = [1, 2, 3];
        let result: Option<i32> = first_some(&strategies, |_| None);

        assert_eq!(result, None);
    }
}
