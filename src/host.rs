//! Operations available to actions run from the command line.

use std::time::Duration;

use actiongraph_config::OperationDef;
use actiongraph_runtime::{HostError, OperationHost};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// `string/concat`, `json/merge` and the asynchronous `time/delay`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoHost;

impl DemoHost {
  pub fn operations() -> Vec<OperationDef> {
    vec![
      OperationDef::sync("string/concat"),
      OperationDef::sync("json/merge"),
      OperationDef::asynchronous("time/delay"),
    ]
  }
}

impl OperationHost for DemoHost {
  fn invoke(&self, operation: &str, args: Value) -> Result<Value, HostError> {
    match operation {
      "string/concat" => {
        let parts = args
          .as_array()
          .ok_or_else(|| HostError::invalid_arguments("string/concat expects a list"))?;
        Ok(Value::String(
          parts
            .iter()
            .map(|part| match part {
              Value::String(s) => s.clone(),
              Value::Null => String::new(),
              other => other.to_string(),
            })
            .collect(),
        ))
      }
      "json/merge" => {
        let objects = args
          .as_array()
          .ok_or_else(|| HostError::invalid_arguments("json/merge expects a list of objects"))?;
        let mut merged = Map::new();
        for object in objects {
          let Value::Object(object) = object else {
            return Err(HostError::invalid_arguments("json/merge expects a list of objects"));
          };
          merged.extend(object.clone());
        }
        Ok(Value::Object(merged))
      }
      _ => Err(HostError::UnknownOperation {
        name: operation.to_string(),
      }),
    }
  }

  fn invoke_async(
    &self,
    operation: &str,
    args: Value,
    cancel: CancellationToken,
  ) -> BoxFuture<'static, Result<Value, HostError>> {
    if operation != "time/delay" {
      return futures::future::ready(self.invoke(operation, args)).boxed();
    }

    async move {
      let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(0);
      let value = args.get("value").cloned().unwrap_or(Value::Null);
      tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(value),
        _ = cancel.cancelled() => Err(HostError::failed("delay cancelled")),
      }
    }
    .boxed()
  }
}
