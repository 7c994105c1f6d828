use std::{
    collections::HashMap,
    env, fs,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use directories::BaseDirs;

/// Key/value configuration loaded from `.autoreportrc` with environment
/// variables taking precedence.
#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let mut map = default_map();
        let config_path = default_config_path();

        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(|l| l.ok()) {
                    let line = line.trim().to_string();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        map.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path }
    }

    /// Build a config from explicit values, ignoring the rc file and the
    /// environment. Used by tests and embedding callers.
    pub fn from_map(map: HashMap<String, String>) -> Self {
        let mut inner = default_map();
        inner.extend(map);
        Self { inner, config_path: default_config_path() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse::<u64>().ok())
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.parse::<f64>().ok())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    /// Root under which per-request workspaces are created.
    pub fn response_dir(&self) -> PathBuf {
        PathBuf::from(self.get("RESPONSE_DIR").unwrap_or_else(|| {
            env::temp_dir().join("autoreport").join("response").to_string_lossy().into_owned()
        }))
    }

    pub fn python_bin(&self) -> String {
        self.get("PYTHON_BIN").unwrap_or_else(|| "python3".into())
    }
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "OPENAI_API_KEY",
        "API_BASE_URL",
        "DEFAULT_MODEL",
        "VISION_MODEL",
        "REQUEST_TIMEOUT",
        "RESPONSE_DIR",
        "PYTHON_BIN",
        "EXECUTION_TIMEOUT",
        "ANNOTATION_BATCH_SIZE",
        "ANNOTATION_MIN_DELAY",
        "REPAIR_MAX_ATTEMPTS",
    ];

    KEYS.contains(&k) || k.starts_with("AUTOREPORT_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("autoreport").join(".autoreportrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    m.insert(
        "RESPONSE_DIR".into(),
        env::temp_dir().join("autoreport").join("response").to_string_lossy().into_owned(),
    );

    // Numbers
    m.insert("REQUEST_TIMEOUT".into(), "120".into());
    m.insert("EXECUTION_TIMEOUT".into(), "0".into()); // 0 = unbounded
    m.insert("ANNOTATION_BATCH_SIZE".into(), "1".into());
    m.insert("ANNOTATION_MIN_DELAY".into(), "3.0".into());
    m.insert("REPAIR_MAX_ATTEMPTS".into(), "3".into());

    // Strings
    m.insert("DEFAULT_MODEL".into(), "gpt-4o".into());
    m.insert("VISION_MODEL".into(), "gpt-4o".into());
    m.insert("API_BASE_URL".into(), "default".into());
    m.insert("PYTHON_BIN".into(), "python3".into());

    m
}
