use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::bandit::Bandit;
use super::brakeman::Brakeman;
use super::gosec::GoSec;
use super::semgrep::Semgrep;
use super::Scanner;
use crate::error::{CoreError, Result};

/// 扫描器描述，供设置界面展示
#[derive(Debug, Clone, Serialize)]
pub struct ScannerInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub language: &'static str,
    pub short_description: &'static str,
}

/// 固定的 id -> 扫描器 映射，启动时构造
#[derive(Clone, Default)]
pub struct ScannerRegistry {
    order: Vec<&'static str>,
    scanners: HashMap<&'static str, Arc<dyn Scanner>>,
}

impl ScannerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置的四个扫描器
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_scanner(Bandit);
        registry.register_scanner(Semgrep);
        registry.register_scanner(GoSec);
        registry.register_scanner(Brakeman);
        registry
    }

    pub fn register_scanner<S: Scanner + 'static>(&mut self, scanner: S) {
        self.register_arc(Arc::new(scanner));
    }

    pub fn register_arc(&mut self, scanner: Arc<dyn Scanner>) {
        let id = scanner.id();
        if self.scanners.insert(id, scanner).is_some() {
            tracing::warn!("Scanner {} registered twice, keeping the latest", id);
        } else {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Scanner>> {
        self.scanners.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scanners.contains_key(id)
    }

    pub fn ids(&self) -> &[&'static str] {
        &self.order
    }

    pub fn descriptions(&self) -> Vec<ScannerInfo> {
        self.order
            .iter()
            .filter_map(|id| self.scanners.get(id))
            .map(|s| ScannerInfo {
                id: s.id(),
                name: s.name(),
                language: s.language(),
                short_description: s.short_description(),
            })
            .collect()
    }

    /// 拒绝未注册的 id（用于项目设置）
    pub fn validate<S: AsRef<str>>(&self, ids: &[S]) -> Result<()> {
        match ids.iter().find(|id| !self.contains(id.as_ref())) {
            Some(unknown) => Err(CoreError::UnknownScanner(unknown.as_ref().to_string())),
            None => Ok(()),
        }
    }
}
