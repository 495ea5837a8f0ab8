#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use minpaku_feasibility::oracle::{OracleError, OracleResponse, ReasoningOracle};

pub const VALID_SEARCH: &str = r#"```json
[{"url": "https://www.airbnb.jp/rooms/101", "title": "神宮前の一軒家", "price_per_night": 22000, "validated": true, "source": "grounding_metadata"}]
```
```json
{"平均単価_中央値": "¥22,000", "価格範囲": "¥22,000〜¥22,000", "宿泊件数": "1件"}
```"#;

pub const EMPTY_SEARCH: &str = r#"```json
[]
```
```json
{"平均単価_中央値": "¥0", "価格範囲": "N/A", "宿泊件数": "0件"}
```"#;

/// Replays queued replies for both plain and search generation, recording
/// every prompt.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<String, OracleError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn then_text(self, text: &str) -> Self {
        self.push(Ok(text.to_string()))
    }

    pub fn then_error(self, err: OracleError) -> Self {
        self.push(Err(err))
    }

    fn push(self, reply: Result<String, OracleError>) -> Self {
        self.replies
            .lock()
            .expect("reply queue mutex poisoned")
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().expect("prompt log mutex poisoned").len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log mutex poisoned").clone()
    }

    fn next(&self, prompt: &str) -> Result<OracleResponse, OracleError> {
        self.prompts
            .lock()
            .expect("prompt log mutex poisoned")
            .push(prompt.to_string());
        self.replies
            .lock()
            .expect("reply queue mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(OracleError::Request("reply queue exhausted".to_string())))
            .map(OracleResponse::text)
    }
}

impl ReasoningOracle for ScriptedOracle {
    fn generate(&self, prompt: &str) -> Result<OracleResponse, OracleError> {
        self.next(prompt)
    }

    fn generate_with_search(&self, prompt: &str) -> Result<OracleResponse, OracleError> {
        self.next(prompt)
    }
}

/// Axis-aligned square feature in lon/lat order.
pub fn square(zoning: &str, code: &str, min: (f64, f64), max: (f64, f64)) -> String {
    format!(
        r#"{{"type":"Feature","properties":{{"A29_005":"{zoning}","A29_004":"{code}"}},"geometry":{{"type":"Polygon","coordinates":[[[{x0},{y0}],[{x1},{y0}],[{x1},{y1}],[{x0},{y1}],[{x0},{y0}]]]}}}}"#,
        x0 = min.0,
        y0 = min.1,
        x1 = max.0,
        y1 = max.1
    )
}

pub fn write_dataset(root: &Path, prefecture: &str, name: &str, features: &[String]) {
    let dir = root.join(prefecture);
    fs::create_dir_all(&dir).expect("create prefecture dir");
    let body = format!(
        r#"{{"type":"FeatureCollection","features":[{}]}}"#,
        features.join(",")
    );
    fs::write(dir.join(name), body).expect("write dataset");
}
