//! 共识投票 - 同一字符串重复出现足够多次才被确认

use log::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRecord {
    pub value: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vote {
    Continue,
    /// 计数达到阈值的值
    Reached(String),
}

/// 按首次出现顺序累计每个候选字符串的次数
///
/// 只做精确匹配，不衰减、不删除。阈值达到后的每次追加都会再次返回
/// `Vote::Reached`，只触发一次由持有者负责。
#[derive(Debug)]
pub struct ConsensusVoter {
    records: Vec<VoteRecord>,
    threshold: u32,
    fired: bool,
}

impl ConsensusVoter {
    pub const DEFAULT_THRESHOLD: u32 = 10;

    pub fn new() -> Self {
        Self::with_threshold(Self::DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            records: Vec::new(),
            threshold: threshold.max(1),
            fired: false,
        }
    }

    pub fn append_candidate(&mut self, value: &str) -> Vote {
        if value.is_empty() {
            return Vote::Continue;
        }

        debug!("Recognized text: {}", value);

        let count = match self.records.iter_mut().find(|r| r.value == value) {
            Some(record) => {
                record.count += 1;
                record.count
            }
            None => {
                self.records.push(VoteRecord {
                    value: value.to_string(),
                    count: 1,
                });
                1
            }
        };

        if count >= self.threshold {
            if !self.fired {
                info!("🎯 Consensus reached: {} ({} votes)", value, count);
            }
            self.fired = true;
            Vote::Reached(value.to_string())
        } else {
            Vote::Continue
        }
    }

    pub fn count(&self, value: &str) -> u32 {
        self.records
            .iter()
            .find(|r| r.value == value)
            .map(|r| r.count)
            .unwrap_or(0)
    }

    /// 首次出现顺序
    pub fn records(&self) -> &[VoteRecord] {
        &self.records
    }

    /// Highest count so far; ties go to the value seen first.
    pub fn leader(&self) -> Option<&VoteRecord> {
        self.records
            .iter()
            .fold(None, |best: Option<&VoteRecord>, r| match best {
                Some(b) if b.count >= r.count => Some(b),
                _ => Some(r),
            })
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn reset(&mut self) {
        self.records.clear();
        self.fired = false;
    }
}

impl Default for ConsensusVoter {
    fn default() -> Self {
        Self::new()
    }
}
