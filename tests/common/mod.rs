use quire::session::ChatMessage;
use quire::storage::{LocalSessionStore, SledBackend, StorageBackend};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

#[allow(dead_code)]
pub fn create_temp_backend() -> (Arc<dyn StorageBackend>, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let backend = SledBackend::open(tmp.path().join("store")).expect("failed to open sled store");
    (Arc::new(backend), tmp)
}

#[allow(dead_code)]
pub fn create_temp_store() -> (LocalSessionStore, TempDir) {
    let (backend, tmp) = create_temp_backend();
    (LocalSessionStore::new(backend), tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("quire.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Greeting followed by one user question
#[allow(dead_code)]
pub fn conversation(question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::model("Hello! Ask me anything about the literature."),
        ChatMessage::user(question),
    ]
}
