//! Endpoint trait and signatures.
//!
//! An endpoint is a named callable. Its signature (ordered parameters, each
//! required or optional) is what result injection consults to find the slot
//! that receives the previous step's value.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One parameter of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub required: bool,
}

/// Ordered parameter list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            required: false,
        });
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Typed endpoint: binds a name and a signature to an argument struct.
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct Sum { a: i64, b: i64 }
///
/// impl Endpoint for Sum {
///     const NAME: &'static str = "sum";
///     fn signature() -> Signature {
///         Signature::new().required("a").required("b")
///     }
/// }
/// ```
///
/// # Trait Bounds
/// - `DeserializeOwned`: arguments are decoded from the JSON payload
/// - `Send + Sync + 'static`: handlers live behind `Arc` in the registry
pub trait Endpoint: DeserializeOwned + Send + Sync + 'static {
    /// Registry key, also the last path segment of the run URL.
    const NAME: &'static str;

    fn signature() -> Signature;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_keeps_declaration_order() {
        let sig = Signature::new().required("a").optional("b").required("c");
        let names: Vec<&str> = sig.params().iter().map(|p| p.name.as_str()).collect();

        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(!sig.params()[1].required);
        assert!(sig.contains("c"));
        assert!(!sig.contains("d"));
    }
}
