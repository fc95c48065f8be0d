//! Arithmetic human-verification challenge.
//!
//! `issue` hands out a question plus an opaque single-use token. `verify`
//! consumes the token on the first attempt, whatever the outcome, and on a
//! correct answer returns a fresh verification token. The verification token
//! is not remembered here; whoever trusts it is responsible for tracking it.

use chrono::{DateTime, TimeDelta, Utc};
use rand::{Rng, RngCore, rngs::OsRng};

use crate::error::ChallengeError;
use crate::models::ChallengeResponse;
use crate::store::{MemoryStore, RecordStore};

// 32 random bytes, hex encoded
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct ChallengeRecord {
    pub expected_answer: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Add,
    Sub,
}

/// A generated puzzle before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Puzzle {
    pub question: String,
    pub answer: u32,
}

pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Two operands in `[1, 10]`, `+` or `-` with equal odds. Subtraction always
/// puts the larger operand first so the answer is never negative.
pub fn generate_puzzle(rng: &mut impl Rng) -> Puzzle {
    let a: u32 = rng.gen_range(1..=10);
    let b: u32 = rng.gen_range(1..=10);
    let op = if rng.gen_bool(0.5) { Operator::Add } else { Operator::Sub };

    match op {
        Operator::Add => Puzzle {
            question: format!("{} + {} = ?", a, b),
            answer: a + b,
        },
        Operator::Sub => {
            let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
            Puzzle {
                question: format!("{} - {} = ?", hi, lo),
                answer: hi - lo,
            }
        }
    }
}

pub struct ChallengeService<S = MemoryStore<ChallengeRecord>> {
    store: S,
    ttl: TimeDelta,
}

impl ChallengeService {
    pub fn new(ttl: TimeDelta) -> Self {
        Self::with_store(MemoryStore::new(), ttl)
    }
}

impl<S: RecordStore<ChallengeRecord>> ChallengeService<S> {
    pub fn with_store(store: S, ttl: TimeDelta) -> Self {
        Self { store, ttl }
    }

    pub fn issue(&self, now: DateTime<Utc>) -> ChallengeResponse {
        let puzzle = generate_puzzle(&mut rand::thread_rng());
        let token = random_token();

        self.store.insert(
            token.clone(),
            ChallengeRecord {
                expected_answer: puzzle.answer.to_string(),
                expires_at: now + self.ttl,
            },
        );

        ChallengeResponse {
            token,
            question: puzzle.question,
        }
    }

    pub fn verify(&self, token: &str, answer: &str, now: DateTime<Utc>) -> Result<String, ChallengeError> {
        // taking the record out makes every token single-use
        let record = self.store.remove(token).ok_or(ChallengeError::InvalidToken)?;

        if now > record.expires_at {
            return Err(ChallengeError::Expired);
        }
        if answer != record.expected_answer {
            return Err(ChallengeError::WrongAnswer);
        }

        Ok(random_token())
    }

    /// Drop challenges past their expiry. A swept token verifies as unknown.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.store.len();
        self.store.retain(|_, record| now <= record.expires_at);
        before.saturating_sub(self.store.len())
    }

    pub fn outstanding(&self) -> usize {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MockStore;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    fn solve(question: &str) -> String {
        let parts: Vec<&str> = question.split_whitespace().collect();
        let a: i64 = parts[0].parse().unwrap();
        let b: i64 = parts[2].parse().unwrap();
        match parts[1] {
            "+" => (a + b).to_string(),
            "-" => (a - b).to_string(),
            op => panic!("unexpected operator {}", op),
        }
    }

    #[test]
    fn puzzles_never_go_negative() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut saw_sub = false;
        let mut saw_add = false;
        for _ in 0..2_000 {
            let puzzle = generate_puzzle(&mut rng);
            let parts: Vec<&str> = puzzle.question.split_whitespace().collect();
            let a: u32 = parts[0].parse().unwrap();
            let b: u32 = parts[2].parse().unwrap();
            assert!((1..=10).contains(&a) && (1..=10).contains(&b));
            match parts[1] {
                "-" => {
                    saw_sub = true;
                    assert!(a >= b, "{}", puzzle.question);
                    assert_eq!(puzzle.answer, a - b);
                }
                "+" => {
                    saw_add = true;
                    assert_eq!(puzzle.answer, a + b);
                }
                op => panic!("unexpected operator {}", op),
            }
            assert_eq!(solve(&puzzle.question), puzzle.answer.to_string());
        }
        assert!(saw_add && saw_sub);
    }

    #[test]
    fn tokens_are_long_and_distinct() {
        let a = random_token();
        let b = random_token();
        assert_eq!(a.len(), TOKEN_BYTES * 2);
        assert_ne!(a, b);
    }

    #[test]
    fn correct_answer_verifies_once() {
        let service = ChallengeService::new(TimeDelta::minutes(5));
        let issued = service.issue(at(0));
        let answer = solve(&issued.question);

        let verification = service.verify(&issued.token, &answer, at(1_000)).unwrap();
        assert_eq!(verification.len(), TOKEN_BYTES * 2);
        assert_ne!(verification, issued.token);

        assert_eq!(
            service.verify(&issued.token, &answer, at(2_000)),
            Err(ChallengeError::InvalidToken)
        );
    }

    #[test]
    fn wrong_answer_consumes_token() {
        let service = ChallengeService::new(TimeDelta::minutes(5));
        let issued = service.issue(at(0));
        let answer = solve(&issued.question);

        assert_eq!(
            service.verify(&issued.token, "not a number", at(1)),
            Err(ChallengeError::WrongAnswer)
        );
        assert_eq!(
            service.verify(&issued.token, &answer, at(2)),
            Err(ChallengeError::InvalidToken)
        );
    }

    #[test]
    fn expired_challenge_rejects_correct_answer() {
        let service = ChallengeService::new(TimeDelta::minutes(5));
        let issued = service.issue(at(0));
        let answer = solve(&issued.question);

        assert_eq!(
            service.verify(&issued.token, &answer, at(300_001)),
            Err(ChallengeError::Expired)
        );
        assert_eq!(service.outstanding(), 0);
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let service = ChallengeService::new(TimeDelta::minutes(5));
        let issued = service.issue(at(0));
        let answer = solve(&issued.question);
        assert!(service.verify(&issued.token, &answer, at(300_000)).is_ok());
    }

    #[test]
    fn unknown_token_is_invalid() {
        let service = ChallengeService::new(TimeDelta::minutes(5));
        assert_eq!(service.verify("", "3", at(0)), Err(ChallengeError::InvalidToken));
        assert_eq!(service.verify("deadbeef", "3", at(0)), Err(ChallengeError::InvalidToken));
    }

    #[test]
    fn sweep_reclaims_expired_challenges() {
        let service = ChallengeService::new(TimeDelta::minutes(5));
        let old = service.issue(at(0));
        service.issue(at(200_000));

        assert_eq!(service.sweep(at(300_001)), 1);
        assert_eq!(service.outstanding(), 1);
        assert_eq!(
            service.verify(&old.token, &solve(&old.question), at(300_002)),
            Err(ChallengeError::InvalidToken)
        );
    }

    #[test]
    fn verify_takes_the_record_out_of_an_injected_store() {
        let store = MockStore::new();
        let service = ChallengeService::with_store(store.clone(), TimeDelta::minutes(5));
        let issued = service.issue(at(0));
        assert_eq!(store.keys(), vec![issued.token.clone()]);
        assert_eq!(store.writes(), 1);

        assert!(service.verify(&issued.token, &solve(&issued.question), at(1)).is_ok());
        assert!(store.keys().is_empty());
    }
}
