//! Result injection.
//!
//! Pure: given what a task declared, what its endpoint accepts and what the
//! previous step produced, compute the payload that is actually sent.

use serde_json::Value;

use crate::domain::errors::InjectionError;
use crate::domain::outcome::Payload;
use crate::typed::Signature;

/// Build the effective payload of a task.
///
/// - declared arguments are kept as they are
/// - `previous` fills the first parameter (declaration order) the task did not
///   declare; at most one value is injected
/// - with no missing parameter `previous` is dropped
/// - declared keys the signature does not know are kept, after the
///   signature's parameters
///
/// Fails when a required parameter is still missing afterwards.
pub fn inject(
    endpoint: &str,
    declared: &Payload,
    signature: &Signature,
    previous: Option<&Value>,
) -> Result<Payload, InjectionError> {
    let mut previous = previous;
    let mut payload = Payload::new();
    let mut missing = Vec::new();

    for param in signature.params() {
        if let Some(value) = declared.get(&param.name) {
            payload.insert(param.name.clone(), value.clone());
        } else if let Some(value) = previous.take() {
            payload.insert(param.name.clone(), value.clone());
        } else if param.required {
            missing.push(param.name.clone());
        }
    }

    for (key, value) in declared {
        if !signature.contains(key) {
            payload.insert(key.clone(), value.clone());
        }
    }

    if !missing.is_empty() {
        return Err(InjectionError::MissingArguments {
            endpoint: endpoint.to_string(),
            missing,
        });
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn payload(v: Value) -> Payload {
        match v {
            Value::Object(map) => map,
            _ => Payload::new(),
        }
    }

    fn sum() -> Signature {
        Signature::new().required("a").required("b")
    }

    #[test]
    fn previous_fills_the_first_missing_slot() {
        let out = inject("sum", &payload(json!({"b": 10})), &sum(), Some(&json!(9))).unwrap();
        assert_eq!(Value::Object(out.clone()), json!({"a": 9, "b": 10}));

        // signature order, not declaration order
        let keys: Vec<&String> = out.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn declared_arguments_are_never_overwritten() {
        let out = inject(
            "sum",
            &payload(json!({"a": 1, "b": 2})),
            &sum(),
            Some(&json!(100)),
        )
        .unwrap();
        assert_eq!(Value::Object(out), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn only_one_value_is_injected() {
        let err = inject("sum", &Payload::new(), &sum(), Some(&json!(5))).unwrap_err();
        assert_eq!(
            err,
            InjectionError::MissingArguments {
                endpoint: "sum".into(),
                missing: vec!["b".into()],
            }
        );
    }

    #[test]
    fn group_results_are_injected_as_one_array() {
        let sig = Signature::new().required("values");
        let out = inject("total", &Payload::new(), &sig, Some(&json!([6, 9]))).unwrap();
        assert_eq!(Value::Object(out), json!({"values": [6, 9]}));
    }

    #[test]
    fn optional_slots_take_part_in_the_order() {
        let sig = Signature::new().optional("scale").required("x");
        let err = inject("scale", &Payload::new(), &sig, Some(&json!(2))).unwrap_err();
        assert!(matches!(
            err,
            InjectionError::MissingArguments { missing, .. } if missing == vec!["x"]
        ));

        let out = inject("scale", &payload(json!({"scale": 3})), &sig, Some(&json!(2))).unwrap();
        assert_eq!(Value::Object(out), json!({"scale": 3, "x": 2}));
    }

    #[test]
    fn unknown_declared_keys_are_kept_last() {
        let out = inject(
            "sum",
            &payload(json!({"note": "hi", "a": 1})),
            &sum(),
            Some(&json!(2)),
        )
        .unwrap();
        let keys: Vec<&String> = out.keys().collect();
        assert_eq!(keys, vec!["a", "b", "note"]);
    }

    #[rstest]
    #[case::no_previous(None)]
    #[case::null_previous(Some(json!(null)))]
    fn missing_optional_slot_is_fine(#[case] previous: Option<Value>) {
        let sig = Signature::new().required("a").optional("b");
        let out = inject("f", &payload(json!({"a": 1})), &sig, previous.as_ref()).unwrap();
        assert_eq!(out.get("a"), Some(&json!(1)));
    }

    #[test]
    fn nothing_missing_drops_previous() {
        let sig = Signature::new();
        let out = inject("noop", &Payload::new(), &sig, Some(&json!(1))).unwrap();
        assert!(out.is_empty());
    }
}
