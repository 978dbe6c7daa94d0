use std::fmt::Display;
use std::str::FromStr;

/// A value edited through a text field, keeping the last valid parse.
pub struct ParsableValue<T> {
    value: T,
    string: String,
    last_parse_ok: bool,
}

impl<T: FromStr + Display + Copy> ParsableValue<T> {
    pub fn new(value: T) -> ParsableValue<T> {
        ParsableValue {
            value,
            string: value.to_string(),
            last_parse_ok: true,
        }
    }

    pub fn editable_string(&mut self) -> &mut String {
        &mut self.string
    }

    pub fn update(&mut self) {
        if let Ok(value) = self.string.trim().parse::<T>() {
            self.value = value;
            self.last_parse_ok = true;
        } else {
            self.last_parse_ok = false;
        }
    }

    /// Overwrite both the value and the text, e.g. after the value was clamped elsewhere.
    pub fn set(&mut self, value: T) {
        self.value = value;
        self.string = value.to_string();
        self.last_parse_ok = true;
    }

    pub fn value(&self) -> T {
        self.value
    }

    pub fn is_parsed_ok(&self) -> bool {
        self.last_parse_ok
    }
}

impl<T: FromStr + Display + Copy> From<T> for ParsableValue<T> {
    fn from(value: T) -> Self {
        ParsableValue::new(value)
    }
}

pub type ParsableFloat = ParsableValue<f64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_last_good_value_on_parse_error() {
        let mut value = ParsableFloat::new(5.0);

        *value.editable_string() = " 12.5 ".to_owned();
        value.update();
        assert_eq!(value.value(), 12.5);
        assert!(value.is_parsed_ok());

        *value.editable_string() = "12.5s".to_owned();
        value.update();
        assert_eq!(value.value(), 12.5);
        assert!(!value.is_parsed_ok());

        value.set(3.0);
        assert_eq!(value.editable_string(), "3");
        assert!(value.is_parsed_ok());
    }
}
