use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use hspf_reader::TimeSeries;

/// One decoded series exposed to the core under a unique signal name.
#[derive(Clone)]
pub struct SignalInfo {
    pub file_id: Uuid,
    pub path: String,
    pub original_name: String, // Column name as decoded from the file
    pub series: Arc<TimeSeries>,
}

#[derive(Clone)]
pub struct AppState {
    // unique_name -> SignalInfo
    pub signals: Arc<RwLock<HashMap<String, SignalInfo>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            signals: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers `series` under `base_name`, or `base_name_N` when taken.
    pub async fn register(
        &self,
        file_id: Uuid,
        path: &str,
        base_name: String,
        series: TimeSeries,
    ) -> String {
        let mut signals = self.signals.write().await;
        let final_name = unique_name(&signals, &base_name);
        signals.insert(
            final_name.clone(),
            SignalInfo {
                file_id,
                path: path.to_string(),
                original_name: base_name,
                series: Arc::new(series),
            },
        );
        final_name
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

fn unique_name(signals: &HashMap<String, SignalInfo>, base_name: &str) -> String {
    if !signals.contains_key(base_name) {
        return base_name.to_string();
    }
    (1..)
        .map(|i| format!("{}_{}", base_name, i))
        .find(|candidate| !signals.contains_key(candidate))
        .unwrap_or_else(|| base_name.to_string())
}
