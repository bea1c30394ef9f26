//! Ordered "first success wins" strategy runner.

use log::debug;

/// One named strategy over an input of type `I`.
pub type Strategy<'a, I, T> = (&'static str, &'a dyn Fn(&I) -> Option<T>);

/// Runs `strategies` in order and returns the first produced value together
/// with the name of the strategy that produced it.
pub fn first_success<I: ?Sized, T>(
    context: &str,
    input: &I,
    strategies: &[Strategy<'_, I, T>],
) -> Option<(&'static str, T)> {
    for (name, strategy) in strategies {
        match strategy(input) {
            Some(value) => {
                debug!("{context}: strategy '{name}' succeeded");
                return Some((*name, value));
            }
            None => debug!("{context}: strategy '{name}' produced nothing"),
        }
    }
    None
}

/// Like [`first_success`], but treats an empty collection as a miss.
pub fn first_non_empty<I: ?Sized, T>(
    context: &str,
    input: &I,
    strategies: &[Strategy<'_, I, Vec<T>>],
) -> Option<(&'static str, Vec<T>)> {
    for (name, strategy) in strategies {
        match strategy(input) {
            Some(values) if !values.is_empty() => {
                debug!(
                    "{context}: strategy '{name}' produced {} values",
                    values.len()
                );
                return Some((*name, values));
            }
            _ => debug!("{context}: strategy '{name}' produced nothing"),
        }
    }
    None
}
