use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// A frame of the `callTracer` output of `debug_traceTransaction`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    #[serde(rename = "type")]
    pub call_type: String,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub input: Bytes,
    #[serde(default)]
    pub output: Option<Bytes>,
    #[serde(default)]
    pub gas_used: Option<U256>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub revert_reason: Option<String>,
    #[serde(default)]
    pub calls: Vec<CallFrame>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceOptions {
    tracer: &'static str,
    tracer_config: TracerConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct TracerConfig {
    with_log: bool,
}

impl TraceOptions {
    pub fn call_tracer() -> Self {
        Self {
            tracer: "callTracer",
            tracer_config: TracerConfig { with_log: true },
        }
    }
}
