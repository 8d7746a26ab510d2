use serde::Serialize;

use crate::invoke::InvocationOutcome;

/// Outcome summary posted to the gateway's async-report endpoint.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AsyncReport {
    /// Function name.
    #[serde(rename = "name")]
    pub function_name: String,
    /// Function status code.
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// Seconds since the delivery was picked up.
    #[serde(rename = "timeTaken")]
    pub time_taken: f64,
}

impl From<&InvocationOutcome> for AsyncReport {
    fn from(o: &InvocationOutcome) -> Self {
        Self {
            function_name: o.function.clone(),
            status_code: o.status,
            time_taken: o.time_taken.as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_wire_names() {
        let r = AsyncReport {
            function_name: "echo".into(),
            status_code: 200,
            time_taken: 0.5,
        };
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            serde_json::json!({"name": "echo", "statusCode": 200, "timeTaken": 0.5})
        );
    }
}
