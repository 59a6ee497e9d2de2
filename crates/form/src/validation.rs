//! Validation engine shared by every value cell.

use std::rc::Rc;

/// Custom validator. Never called with an empty value.
pub type Validator<T> = Rc<dyn Fn(&T) -> Result<(), String>>;

pub const REQUIRED_MESSAGE: &str = "Required";

/// Combines the required flag with an optional custom validator.
///
/// Returns `None` when the value is acceptable, otherwise the message to show.
///
/// ```rust
/// use cean_form::validation::validate;
///
/// assert_eq!(validate::<String>(true, None, None), Some("Required".to_string()));
/// assert_eq!(validate::<String>(false, None, None), None);
/// ```
pub fn validate<T>(required: bool, validator: Option<&Validator<T>>, value: Option<&T>) -> Option<String> {
    match (value, validator) {
        (None, _) if required => Some(REQUIRED_MESSAGE.to_string()),
        (None, _) => None,
        (Some(value), Some(validator)) => validator(value).err(),
        (Some(_), None) => None,
    }
}

/// Wraps a plain function as a [`Validator`].
pub fn validator<T>(f: impl Fn(&T) -> Result<(), String> + 'static) -> Validator<T> {
    Rc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn empty_values_never_reach_the_custom_validator() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let check: Validator<String> = validator(move |_| {
            counter.set(counter.get() + 1);
            Err("nope".to_string())
        });

        assert_eq!(validate(true, Some(&check), None), Some(REQUIRED_MESSAGE.to_string()));
        assert_eq!(validate(false, Some(&check), None), None);
        assert_eq!(calls.get(), 0);

        assert_eq!(validate(false, Some(&check), Some(&"x".to_string())), Some("nope".to_string()));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn present_value_without_validator_is_valid() {
        assert_eq!(validate(true, None, Some(&0_u64)), None);
    }
}
