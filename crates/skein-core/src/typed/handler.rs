//! Handlers - the code behind an endpoint.
//!
//! Two layers:
//! - `Handler<T>`: typed, receives the decoded argument struct
//! - `DynHandler`: object-safe, receives the raw payload; what the registry
//!   stores and the runner invokes

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::endpoint::{Endpoint, Signature};
use crate::domain::errors::TaskError;
use crate::domain::outcome::Payload;

#[async_trait]
pub trait Handler<T: Endpoint>: Send + Sync {
    type Output: Serialize + Send;

    async fn handle(&self, args: T) -> Result<Self::Output, TaskError>;
}

#[async_trait]
pub trait DynHandler: Send + Sync {
    fn name(&self) -> &str;

    fn signature(&self) -> &Signature;

    async fn invoke(&self, payload: Payload) -> Result<Value, TaskError>;
}

/// Adapts a `Handler<T>` to `DynHandler`.
pub struct TypedHandler<T: Endpoint, H: Handler<T>> {
    handler: H,
    signature: Signature,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Endpoint, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            signature: T::signature(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Endpoint, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    fn name(&self) -> &str {
        T::NAME
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    async fn invoke(&self, payload: Payload) -> Result<Value, TaskError> {
        let args: T = serde_json::from_value(Value::Object(payload))?;
        let output = self.handler.handle(args).await?;
        serde_json::to_value(output).map_err(|e| TaskError::new(format!("encode result: {e}")))
    }
}

/// Endpoint backed by a plain function over the raw payload. Handy for
/// callbacks that accept whatever they are given.
pub struct FnHandler<F> {
    name: String,
    signature: Signature,
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(Payload) -> Result<Value, TaskError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, signature: Signature, f: F) -> Self {
        Self {
            name: name.into(),
            signature,
            f,
        }
    }
}

#[async_trait]
impl<F> DynHandler for FnHandler<F>
where
    F: Fn(Payload) -> Result<Value, TaskError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    async fn invoke(&self, payload: Payload) -> Result<Value, TaskError> {
        (self.f)(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Sum {
        a: i64,
        b: i64,
    }

    impl Endpoint for Sum {
        const NAME: &'static str = "sum";

        fn signature() -> Signature {
            Signature::new().required("a").required("b")
        }
    }

    struct SumHandler;

    #[async_trait]
    impl Handler<Sum> for SumHandler {
        type Output = i64;

        async fn handle(&self, args: Sum) -> Result<i64, TaskError> {
            Ok(args.a + args.b)
        }
    }

    fn payload(v: Value) -> Payload {
        match v {
            Value::Object(map) => map,
            _ => Payload::new(),
        }
    }

    #[tokio::test]
    async fn typed_handler_decodes_and_encodes() {
        let handler = TypedHandler::<Sum, _>::new(SumHandler);
        let out = handler.invoke(payload(json!({"a": 4, "b": 5}))).await.unwrap();

        assert_eq!(out, json!(9));
        assert_eq!(handler.name(), "sum");
        assert_eq!(handler.signature().params().len(), 2);
    }

    #[tokio::test]
    async fn bad_arguments_are_task_errors() {
        let handler = TypedHandler::<Sum, _>::new(SumHandler);
        let err = handler.invoke(payload(json!({"a": 4}))).await.unwrap_err();
        assert!(err.message.contains("missing field `b`"));
    }

    #[tokio::test]
    async fn fn_handler_sees_the_raw_payload() {
        let handler = FnHandler::new("echo", Signature::new(), |p: Payload| {
            Ok(Value::Object(p))
        });
        let out = handler.invoke(payload(json!({"x": 1}))).await.unwrap();
        assert_eq!(out, json!({"x": 1}));
    }
}
