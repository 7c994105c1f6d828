#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;

use autoreport::llm::{ChatMessage, ChatService};
use autoreport::report::pdf::{Block, DocumentRenderer, PageDecoration};

/// Service double that always answers with the same text.
pub struct CannedChat {
    reply: String,
    calls: AtomicUsize,
}

impl CannedChat {
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into(), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatService for CannedChat {
    async fn complete(&self, _messages: Vec<ChatMessage>) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// Service double that always fails.
pub struct FailingChat {
    calls: AtomicUsize,
}

impl FailingChat {
    pub fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatService for FailingChat {
    async fn complete(&self, _messages: Vec<ChatMessage>) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("service unavailable"))
    }
}

/// Renderer double producing a fixed byte marker.
pub struct FakeRenderer;

impl DocumentRenderer for FakeRenderer {
    fn render(
        &self,
        _blocks: &[Block],
        _decorate: &dyn Fn(u32) -> PageDecoration,
    ) -> autoreport::error::Result<Vec<u8>> {
        Ok(b"%PDF-fake".to_vec())
    }
}

/// Annotation reply with the three standard section shapes.
pub fn sections_reply() -> String {
    r#"{
        "sections": [
            {
                "title": "Score Trend",
                "heading": "Analysis Overview",
                "content": "Scores trend upward over the sample.",
                "data_points": [
                    {"metric": "mean", "value": 72.5, "significance": "baseline level"}
                ]
            },
            {
                "heading": "Statistical Evidence",
                "content": "The median sits close to the mean.",
                "calculations": [
                    {"name": "median", "value": 71, "interpretation": "no strong skew"}
                ]
            },
            {
                "heading": "Conclusions and Recommendations",
                "content": "The trend is consistent.",
                "key_conclusions": [
                    {"finding": "upward trend", "impact": "positive", "recommendation": "keep monitoring"}
                ],
                "limitations": ["small sample"],
                "next_steps": ["collect more data"]
            }
        ]
    }"#
    .to_string()
}

/// True when a Python interpreter with the packages the injected encoder
/// needs is on PATH.
pub fn python_with_numpy_available() -> bool {
    std::process::Command::new("python3")
        .args(["-c", "import numpy, pandas"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
