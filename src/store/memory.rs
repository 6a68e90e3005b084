// src/store/memory.rs

// In-memory store (for testing and lightweight single-process usage)
// One mutex spans every procedure body, so executions against the store
// are serialized exactly as a server-side script would be.
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Result, StoreError, ThrottleError};
use crate::store::{AtomicProcedure, AtomicStore, StoreValue};

#[derive(Debug, Clone)]
enum EntryValue {
    Counter(i64),
    Bucket { tokens: f64, last_refill: f64 },
    /// Kept sorted by score ascending
    Sorted(Vec<(String, f64)>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: EntryValue,
    expires_at: Option<Instant>,
}

/// In-memory implementation of the atomic-store contract
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

type Map = HashMap<String, Entry>;

/// Drop the entry if its TTL has passed, then return it
fn live_entry<'a>(data: &'a mut Map, key: &str) -> Option<&'a mut Entry> {
    let expired = data
        .get(key)
        .and_then(|e| e.expires_at)
        .is_some_and(|at| at <= Instant::now());
    if expired {
        data.remove(key);
    }
    data.get_mut(key)
}

fn counter_value(data: &mut Map, key: &str) -> Result<i64> {
    match live_entry(data, key) {
        Some(entry) => match entry.value {
            EntryValue::Counter(v) => Ok(v),
            _ => Err(wrong_type(key)),
        },
        None => Ok(0),
    }
}

fn sorted_members<'a>(data: &'a mut Map, key: &str) -> Result<Option<&'a mut Vec<(String, f64)>>> {
    match live_entry(data, key) {
        Some(entry) => match &mut entry.value {
            EntryValue::Sorted(members) => Ok(Some(members)),
            _ => Err(wrong_type(key)),
        },
        None => Ok(None),
    }
}

fn wrong_type(key: &str) -> ThrottleError {
    ThrottleError::Store(StoreError::Serialization(format!(
        "wrong value type at key: {}",
        key
    )))
}

fn set_ttl(entry: &mut Entry, ttl: Duration) {
    entry.expires_at = Some(Instant::now() + ttl);
}

impl MemoryStore {
    fn token_bucket_take(
        &self,
        data: &mut Map,
        key: &str,
        args: &[StoreValue],
    ) -> Result<Vec<StoreValue>> {
        let capacity = args[0].as_f64()?;
        let refill_rate = args[1].as_f64()?;
        let cost = args[2].as_f64()?;
        let now = args[3].as_f64()?;

        let (mut tokens, last_refill) = match live_entry(data, key) {
            Some(Entry {
                value: EntryValue::Bucket {
                    tokens,
                    last_refill,
                },
                ..
            }) => (*tokens, *last_refill),
            Some(_) => return Err(wrong_type(key)),
            None => (capacity, now),
        };

        let elapsed = (now - last_refill).max(0.0);
        tokens = (tokens + elapsed * refill_rate).min(capacity);

        let allowed = tokens >= cost;
        if allowed {
            tokens -= cost;
        }
        let retry_after = if allowed {
            0.0
        } else {
            (cost - tokens) / refill_rate
        };

        let mut entry = Entry {
            value: EntryValue::Bucket {
                tokens,
                last_refill: now,
            },
            expires_at: None,
        };
        set_ttl(&mut entry, Duration::from_secs(3600));
        data.insert(key.to_string(), entry);

        Ok(vec![
            StoreValue::Int(allowed as i64),
            StoreValue::Int(tokens.floor() as i64),
            StoreValue::Float(retry_after),
        ])
    }

    fn token_bucket_refund(
        &self,
        data: &mut Map,
        key: &str,
        args: &[StoreValue],
    ) -> Result<Vec<StoreValue>> {
        let capacity = args[0].as_f64()?;
        let amount = args[1].as_f64()?;
        let now = args[2].as_f64()?;

        let (tokens, last_refill) = match live_entry(data, key) {
            Some(Entry {
                value: EntryValue::Bucket {
                    tokens,
                    last_refill,
                },
                ..
            }) => (*tokens, *last_refill),
            Some(_) => return Err(wrong_type(key)),
            None => (capacity, now),
        };

        let tokens = (tokens + amount).min(capacity);
        let mut entry = Entry {
            value: EntryValue::Bucket {
                tokens,
                last_refill,
            },
            expires_at: None,
        };
        set_ttl(&mut entry, Duration::from_secs(3600));
        data.insert(key.to_string(), entry);

        Ok(vec![StoreValue::Int(tokens.floor() as i64)])
    }

    fn fixed_window_take(
        &self,
        data: &mut Map,
        key: &str,
        args: &[StoreValue],
    ) -> Result<Vec<StoreValue>> {
        let limit = args[0].as_i64()?;
        let cost = args[1].as_i64()?;
        let ttl_secs = args[2].as_i64()?;

        let mut count = counter_value(data, key)?;
        let allowed = count + cost <= limit;
        let ttl = Duration::from_secs(ttl_secs.max(0) as u64);
        if allowed {
            count += cost;
            data.insert(
                key.to_string(),
                Entry {
                    value: EntryValue::Counter(count),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
        } else if let Some(entry) = live_entry(data, key) {
            set_ttl(entry, ttl);
        }

        Ok(vec![StoreValue::Int(allowed as i64), StoreValue::Int(count)])
    }

    fn window_refund(
        &self,
        data: &mut Map,
        key: &str,
        args: &[StoreValue],
    ) -> Result<Vec<StoreValue>> {
        let amount = args[0].as_i64()?;
        match live_entry(data, key) {
            Some(entry) => match &mut entry.value {
                EntryValue::Counter(v) => {
                    // Floor at zero; TTL stays whatever the take set
                    *v = v.saturating_sub(amount).max(0);
                    Ok(vec![StoreValue::Int(*v)])
                }
                _ => Err(wrong_type(key)),
            },
            // The window expired or rolled over: nothing to give back
            None => Ok(vec![StoreValue::Int(0)]),
        }
    }

    fn sliding_counter_take(
        &self,
        data: &mut Map,
        keys: &[String],
        args: &[StoreValue],
    ) -> Result<Vec<StoreValue>> {
        let window_secs = args[0].as_f64()?;
        let limit = args[1].as_i64()?;
        let cost = args[2].as_i64()?;
        let now = args[3].as_f64()?;
        let window_start = args[4].as_f64()?;

        let current = counter_value(data, &keys[0])?;
        let previous = counter_value(data, &keys[1])?;

        let elapsed = now - window_start;
        let overlap = (window_secs - elapsed) / window_secs;
        let estimate = (previous as f64 * overlap).floor() as i64 + current;

        let (allowed, remaining) = if estimate + cost <= limit {
            let mut entry = Entry {
                value: EntryValue::Counter(current + cost),
                expires_at: None,
            };
            set_ttl(&mut entry, Duration::from_secs_f64(window_secs * 2.0));
            data.insert(keys[0].clone(), entry);
            (1, limit - estimate - cost)
        } else {
            (0, 0)
        };

        Ok(vec![
            StoreValue::Int(allowed),
            StoreValue::Int(remaining),
            StoreValue::Int(estimate),
        ])
    }

    fn sliding_log_take(
        &self,
        data: &mut Map,
        key: &str,
        args: &[StoreValue],
    ) -> Result<Vec<StoreValue>> {
        let window_secs = args[0].as_f64()?;
        let limit = args[1].as_i64()?;
        let cost = args[2].as_i64()?;
        let now = args[3].as_f64()?;

        let cutoff = now - window_secs;
        let mut count = match sorted_members(data, key)? {
            Some(members) => {
                members.retain(|(_, score)| *score > cutoff);
                members.len() as i64
            }
            None => 0,
        };

        let allowed = count + cost <= limit;
        if allowed {
            if live_entry(data, key).is_none() {
                data.insert(
                    key.to_string(),
                    Entry {
                        value: EntryValue::Sorted(Vec::new()),
                        expires_at: None,
                    },
                );
            }
            let entry = data.get_mut(key).expect("entry present");
            let members = match &mut entry.value {
                EntryValue::Sorted(members) => members,
                _ => return Err(wrong_type(key)),
            };
            for i in 0..cost {
                members.push((format!("{}:{}", now, i), now));
            }
            members.sort_by(|a, b| a.1.total_cmp(&b.1));
            count += cost;
            set_ttl(entry, Duration::from_secs_f64(window_secs));
        }

        let oldest = match sorted_members(data, key)? {
            Some(members) => members.first().map(|(_, score)| *score).unwrap_or(-1.0),
            None => -1.0,
        };

        Ok(vec![
            StoreValue::Int(allowed as i64),
            StoreValue::Int(count),
            StoreValue::Float(oldest),
        ])
    }
}

#[async_trait]
impl AtomicStore for MemoryStore {
    async fn execute(
        &self,
        procedure: AtomicProcedure,
        keys: &[String],
        args: &[StoreValue],
    ) -> Result<Vec<StoreValue>> {
        let mut data = self.data.lock().unwrap();
        match procedure {
            AtomicProcedure::TokenBucketTake => self.token_bucket_take(&mut data, &keys[0], args),
            AtomicProcedure::TokenBucketRefund => {
                self.token_bucket_refund(&mut data, &keys[0], args)
            }
            AtomicProcedure::FixedWindowTake => self.fixed_window_take(&mut data, &keys[0], args),
            AtomicProcedure::WindowRefund => self.window_refund(&mut data, &keys[0], args),
            AtomicProcedure::SlidingCounterTake => self.sliding_counter_take(&mut data, keys, args),
            AtomicProcedure::SlidingLogTake => self.sliding_log_take(&mut data, &keys[0], args),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<i64>> {
        let mut data = self.data.lock().unwrap();
        match live_entry(&mut data, key) {
            Some(entry) => match entry.value {
                EntryValue::Counter(v) => Ok(Some(v)),
                _ => Err(wrong_type(key)),
            },
            None => Ok(None),
        }
    }

    async fn increment_by(&self, key: &str, amount: i64) -> Result<i64> {
        let mut data = self.data.lock().unwrap();
        if live_entry(&mut data, key).is_none() {
            data.insert(
                key.to_string(),
                Entry {
                    value: EntryValue::Counter(amount),
                    expires_at: None,
                },
            );
            return Ok(amount);
        }
        match &mut data.get_mut(key).expect("entry present").value {
            EntryValue::Counter(v) => {
                *v += amount;
                Ok(*v)
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut data = self.data.lock().unwrap();
        match live_entry(&mut data, key) {
            Some(entry) => {
                set_ttl(entry, ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut data = self.data.lock().unwrap();
        Ok(data.remove(key).is_some())
    }

    async fn sorted_remove_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<u64> {
        let mut data = self.data.lock().unwrap();
        match sorted_members(&mut data, key)? {
            Some(members) => {
                let before = members.len();
                members.retain(|(_, score)| *score < min || *score > max);
                Ok((before - members.len()) as u64)
            }
            None => Ok(0),
        }
    }

    async fn sorted_cardinality(&self, key: &str) -> Result<u64> {
        let mut data = self.data.lock().unwrap();
        match sorted_members(&mut data, key)? {
            Some(members) => Ok(members.len() as u64),
            None => Ok(0),
        }
    }

    async fn sorted_add(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        if sorted_members(&mut data, key)?.is_none() {
            data.insert(
                key.to_string(),
                Entry {
                    value: EntryValue::Sorted(vec![(member.to_string(), score)]),
                    expires_at: None,
                },
            );
            return Ok(());
        }
        let members = sorted_members(&mut data, key)?.expect("entry present");
        members.retain(|(m, _)| m != member);
        members.push((member.to_string(), score));
        members.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(())
    }

    async fn sorted_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<(String, f64)>> {
        let mut data = self.data.lock().unwrap();
        match sorted_members(&mut data, key)? {
            Some(members) => {
                let len = members.len() as i64;
                let clamp = |i: i64| -> usize {
                    let idx = if i < 0 { len + i } else { i };
                    idx.clamp(0, len) as usize
                };
                let (start, stop) = (clamp(start), clamp(stop).min(len.saturating_sub(1) as usize));
                if start > stop || members.is_empty() {
                    return Ok(Vec::new());
                }
                Ok(members[start..=stop].to_vec())
            }
            None => Ok(Vec::new()),
        }
    }
}
