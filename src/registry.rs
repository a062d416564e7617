//! Outstanding pairing-code registry.
//!
//! Codes are 4-digit, collision-checked at issuance, single-use, and expire
//! after a TTL. Each code is bound to a freshly minted room id which the
//! caller is expected to register with the room directory.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use dashmap::DashMap;
use rand::Rng;

pub const CODE_MIN: u32 = 1000;
pub const CODE_MAX: u32 = 9999;

/// Attempts before giving up on finding a free code.
const MAX_GENERATE_ATTEMPTS: usize = 64;

#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub room_id: String,
}

#[derive(Debug, Clone)]
struct OutstandingCode {
    room_id: String,
    issued_at: Instant,
}

#[derive(Debug, thiserror::Error)]
pub enum CodeError {
    /// Unknown, malformed, or already-consumed code.
    #[error("invalid code")]
    Invalid,
    #[error("code expired")]
    Expired,
    /// Could not find a free code; the 4-digit space is saturated.
    #[error("code space exhausted")]
    Exhausted,
}

pub struct CodeRegistry {
    codes: DashMap<String, OutstandingCode>,
    ttl: Duration,
}

impl CodeRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            codes: DashMap::new(),
            ttl,
        }
    }

    /// Issue a new pairing code and mint its room id.
    ///
    /// The code is recorded as outstanding; generation retries on collision
    /// with a still-outstanding code instead of silently reissuing it.
    pub fn generate(&self) -> Result<IssuedCode, CodeError> {
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_GENERATE_ATTEMPTS {
            let code = format!("{:04}", rng.gen_range(CODE_MIN..=CODE_MAX));
            let room_id = mint_room_id();
            match self.codes.entry(code.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => continue,
                dashmap::mapref::entry::Entry::Vacant(v) => {
                    v.insert(OutstandingCode {
                        room_id: room_id.clone(),
                        issued_at: Instant::now(),
                    });
                    return Ok(IssuedCode { code, room_id });
                }
            }
        }
        Err(CodeError::Exhausted)
    }

    /// Verify a candidate code. Single-use: a successful verification
    /// consumes the code and returns the bound room id.
    pub fn verify(&self, candidate: &str) -> Result<String, CodeError> {
        let entry = self.codes.remove(candidate).ok_or(CodeError::Invalid)?;
        let (_, outstanding) = entry;
        if outstanding.issued_at.elapsed() > self.ttl {
            return Err(CodeError::Expired);
        }
        Ok(outstanding.room_id)
    }

    /// Drop codes past their TTL. Returns how many were evicted.
    ///
    /// Removals are counted inside the retain pass; a length diff would race
    /// concurrent `generate` calls and could underflow.
    pub fn evict_expired(&self) -> usize {
        let evicted = AtomicUsize::new(0);
        self.codes.retain(|_, c| {
            let keep = c.issued_at.elapsed() <= self.ttl;
            if !keep {
                evicted.fetch_add(1, Ordering::Relaxed);
            }
            keep
        });
        evicted.into_inner()
    }

    pub fn outstanding(&self) -> usize {
        self.codes.len()
    }
}

fn mint_room_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("r-{}", &id[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CodeRegistry {
        CodeRegistry::new(Duration::from_secs(300))
    }

    #[test]
    fn generated_code_is_four_digits_in_range() {
        let reg = registry();
        let issued = reg.generate().unwrap();
        assert_eq!(issued.code.len(), 4);
        let n: u32 = issued.code.parse().unwrap();
        assert!((CODE_MIN..=CODE_MAX).contains(&n));
        assert!(issued.room_id.starts_with("r-"));
    }

    #[test]
    fn verify_consumes_the_code() {
        let reg = registry();
        let issued = reg.generate().unwrap();
        assert_eq!(reg.verify(&issued.code).unwrap(), issued.room_id);
        // Second verification of the same code fails.
        assert!(matches!(reg.verify(&issued.code), Err(CodeError::Invalid)));
    }

    #[test]
    fn unknown_code_is_rejected() {
        let reg = registry();
        assert!(matches!(reg.verify("0000"), Err(CodeError::Invalid)));
        assert!(matches!(reg.verify("not a code"), Err(CodeError::Invalid)));
    }

    #[test]
    fn expired_code_is_rejected() {
        let reg = CodeRegistry::new(Duration::ZERO);
        let issued = reg.generate().unwrap();
        assert!(matches!(reg.verify(&issued.code), Err(CodeError::Expired)));
    }

    #[test]
    fn eviction_sweeps_expired_codes() {
        let reg = CodeRegistry::new(Duration::ZERO);
        for _ in 0..5 {
            reg.generate().unwrap();
        }
        assert_eq!(reg.evict_expired(), 5);
        assert_eq!(reg.outstanding(), 0);
    }

    #[test]
    fn eviction_count_stays_exact_under_concurrent_generation() {
        use std::sync::Arc;

        let reg = Arc::new(CodeRegistry::new(Duration::ZERO));
        let writer = {
            let reg = Arc::clone(&reg);
            std::thread::spawn(move || {
                let mut generated = 0usize;
                for _ in 0..500 {
                    if reg.generate().is_ok() {
                        generated += 1;
                    }
                }
                generated
            })
        };

        // Sweep while the writer is inserting; every count must stay exact
        // (a stale length diff would underflow here and panic).
        let mut evicted = 0;
        while !writer.is_finished() {
            evicted += reg.evict_expired();
        }
        let generated = writer.join().unwrap();
        evicted += reg.evict_expired();

        assert_eq!(evicted, generated);
        assert_eq!(reg.outstanding(), 0);
    }

    #[test]
    fn codes_do_not_collide_while_outstanding() {
        let reg = registry();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let issued = reg.generate().unwrap();
            assert!(seen.insert(issued.code), "duplicate outstanding code");
        }
    }
}
