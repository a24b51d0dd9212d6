//! Tuning parameters and concrete settings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named discrete tuning variable with an ordered list of candidate values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub values: Vec<usize>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, values: &[usize]) -> Self {
        Self {
            name: name.into(),
            values: values.to_vec(),
        }
    }
}

/// One concrete `(name, value)` pair drawn from a [`Parameter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub name: String,
    pub value: usize,
}

impl Setting {
    pub fn new(name: impl Into<String>, value: usize) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// The preprocessor line injected ahead of the kernel source.
    pub fn define(&self) -> String {
        format!("#define {} {}\n", self.name, self.value)
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// A complete assignment of values to all declared parameters of a kernel,
/// in parameter declaration order.
pub type Configuration = Vec<Setting>;

/// Concatenates the `#define` lines for every setting, in declaration order.
pub fn define_prelude(configuration: &Configuration) -> String {
    let mut prelude = String::new();
    for setting in configuration {
        prelude.push_str(&setting.define());
    }
    prelude
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_define_line() {
        let setting = Setting::new("TILE", 64);
        assert_eq!(setting.define(), "#define TILE 64\n");
    }

    #[test]
    fn prelude_preserves_declaration_order() {
        let config = vec![Setting::new("A", 1), Setting::new("B", 2)];
        assert_eq!(define_prelude(&config), "#define A 1\n#define B 2\n");
    }
}
