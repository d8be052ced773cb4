use std::collections::HashSet;

use chrono::{DateTime, Utc};
use latch_common::{
    card_type::CardType, params::GenerateCodesParams, policy::ValidityPolicy,
    views::ActivationCode,
};
use latch_db::{
    models::DbActivationCode,
    storage::{CodeStore, StoreError},
};
use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::{Engine, EngineError, EngineResult};

/// Crockford's base32 alphabet: no I, L, O or U.
const TOKEN_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const TOKEN_GROUPS: usize = 4;
const GROUP_LEN: usize = 6;

/// How many rounds of redrawing colliding tokens before giving up.
const MAX_REDRAWS: usize = 8;

/// How many times a whole batch is rebuilt after the store reports a
/// collision on insert.
const MAX_BATCH_ATTEMPTS: usize = 3;

/// Draw one token, four dash-separated groups of six symbols (120 bits).
pub fn generate_token<R: Rng>(rng: &mut R) -> String {
    let mut token = String::with_capacity(TOKEN_GROUPS * (GROUP_LEN + 1));
    for group in 0..TOKEN_GROUPS {
        if group > 0 {
            token.push('-');
        }
        for _ in 0..GROUP_LEN {
            let idx = rng.random_range(0..TOKEN_ALPHABET.len());
            token.push(char::from(TOKEN_ALPHABET[idx]));
        }
    }
    token
}

fn draw_tokens(count: usize) -> Vec<String> {
    let mut rng = rand::rng();
    (0..count).map(|_| generate_token(&mut rng)).collect()
}

/// A generation request that passed validation.
#[derive(Debug, Clone, PartialEq)]
struct BatchRequest {
    amount: usize,
    policy: ValidityPolicy,
    card_type: Option<String>,
}

impl BatchRequest {
    fn resolve(
        params: GenerateCodesParams,
        max_batch_size: u32,
        now: DateTime<Utc>,
    ) -> EngineResult<Self> {
        if params.amount == 0 || params.amount > max_batch_size {
            return Err(EngineError::invalid(format!(
                "amount must be between 1 and {max_batch_size}"
            )));
        }

        let label = params
            .card_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let preset = label.and_then(CardType::preset);
        let card_type = match (preset, label) {
            (Some(preset), _) => Some(preset.name.to_string()),
            (None, label) => label.map(str::to_string),
        };

        let valid_days = match (params.expires_at, params.valid_days, preset) {
            (None, None, Some(preset)) => Some(preset.days),
            (_, days, _) => days,
        };

        let policy = ValidityPolicy::from_parts(params.expires_at, valid_days)
            .map_err(|e| EngineError::invalid(e.to_string()))?;

        if let ValidityPolicy::UseBy(deadline) = policy {
            if deadline <= now {
                return Err(EngineError::invalid("expires_at must be in the future"));
            }
        }

        Ok(Self {
            amount: params.amount as usize,
            policy,
            card_type,
        })
    }
}

impl Engine {
    /// Create `amount` fresh, unused codes sharing one validity policy.
    ///
    /// The batch is written atomically: either every code is stored or none
    /// is.
    #[instrument(skip(self, params), fields(amount = params.amount))]
    pub async fn generate(
        &self,
        params: GenerateCodesParams,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<ActivationCode>> {
        let request = BatchRequest::resolve(params, self.config.max_batch_size, now)?;

        for attempt in 1..=MAX_BATCH_ATTEMPTS {
            let tokens = self.unique_tokens(request.amount, draw_tokens).await?;

            let rows = {
                let mut ids = self.ids.lock();
                tokens
                    .into_iter()
                    .map(|token| {
                        let id = ids
                            .next_id()
                            .map_err(|e| StoreError::Internal(Box::new(e)))?;
                        Ok(DbActivationCode::new(
                            id,
                            token,
                            request.policy,
                            request.card_type.clone(),
                            now,
                        ))
                    })
                    .collect::<EngineResult<Vec<_>>>()?
            };

            match self.db.insert_codes(rows.clone()).await {
                Ok(()) => {
                    info!(
                        count = rows.len(),
                        card_type = request.card_type.as_deref(),
                        "Generated activation codes"
                    );
                    return rows
                        .into_iter()
                        .map(|row| ActivationCode::try_from(row).map_err(EngineError::from))
                        .collect();
                }
                Err(StoreError::DuplicateCode) => {
                    warn!(attempt, "Batch collided with a concurrent insert, regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(EngineError::Conflict)
    }

    /// Collect `amount` tokens that are distinct from each other and from
    /// every stored code. Only the colliding tokens are redrawn.
    async fn unique_tokens<F>(&self, amount: usize, mut draw: F) -> EngineResult<Vec<String>>
    where
        F: FnMut(usize) -> Vec<String> + Send,
    {
        let mut tokens = Vec::with_capacity(amount);
        let mut seen = HashSet::with_capacity(amount);

        for _ in 0..MAX_REDRAWS {
            let missing = amount - tokens.len();
            if missing == 0 {
                break;
            }

            let fresh: Vec<String> = draw(missing)
                .into_iter()
                .filter(|t| seen.insert(t.clone()))
                .collect();
            let taken: HashSet<String> = self
                .db
                .existing_codes(&fresh)
                .await?
                .into_iter()
                .collect();

            if !taken.is_empty() {
                debug!(collisions = taken.len(), "Redrawing tokens that are already taken");
            }
            tokens.extend(fresh.into_iter().filter(|t| !taken.contains(t)));
        }

        if tokens.len() < amount {
            warn!(amount, found = tokens.len(), "Could not draw enough unique tokens");
            return Err(EngineError::Conflict);
        }

        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use chrono::TimeDelta;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::testing::{engine, t0};

    fn params(amount: u32) -> GenerateCodesParams {
        GenerateCodesParams {
            amount,
            ..Default::default()
        }
    }

    fn scripted(batches: Vec<Vec<&str>>) -> impl FnMut(usize) -> Vec<String> + Send {
        let mut batches: VecDeque<Vec<String>> = batches
            .into_iter()
            .map(|b| b.into_iter().map(str::to_string).collect())
            .collect();
        move |_| batches.pop_front().unwrap_or_default()
    }

    #[test]
    fn token_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let token = generate_token(&mut rng);
            let groups: Vec<_> = token.split('-').collect();
            assert_eq!(groups.len(), 4);
            assert!(groups.iter().all(|g| g.len() == 6));
            assert!(
                groups
                    .concat()
                    .bytes()
                    .all(|b| TOKEN_ALPHABET.contains(&b))
            );
        }
    }

    #[tokio::test]
    async fn generates_unused_codes_with_shared_policy() {
        let (engine, stg) = engine();
        let codes = engine
            .generate(
                GenerateCodesParams {
                    amount: 5,
                    valid_days: Some(30),
                    ..Default::default()
                },
                t0(),
            )
            .await
            .unwrap();

        assert_eq!(codes.len(), 5);
        let distinct: HashSet<_> = codes.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(distinct.len(), 5);
        for code in &codes {
            assert!(!code.is_used);
            assert_eq!(code.used_at, None);
            assert_eq!(code.used_by, None);
            assert_eq!(code.created_at, t0());
            assert_eq!(code.valid_days, Some(30));
            assert_eq!(code.expires_at, None);
            assert!(stg.find_code(&code.code).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn preset_supplies_window_and_canonical_label() {
        let (engine, _) = engine();
        let codes = engine
            .generate(
                GenerateCodesParams {
                    amount: 1,
                    card_type: Some("  Quarter ".into()),
                    ..Default::default()
                },
                t0(),
            )
            .await
            .unwrap();

        assert_eq!(codes[0].card_type.as_deref(), Some("quarter"));
        assert_eq!(codes[0].valid_days, Some(90));
    }

    #[tokio::test]
    async fn explicit_policy_beats_preset_window() {
        let (engine, _) = engine();
        let deadline = t0() + TimeDelta::days(3);
        let codes = engine
            .generate(
                GenerateCodesParams {
                    amount: 1,
                    expires_at: Some(deadline),
                    card_type: Some("year".into()),
                    ..Default::default()
                },
                t0(),
            )
            .await
            .unwrap();

        assert_eq!(codes[0].valid_days, None);
        assert_eq!(codes[0].expires_at, Some(deadline));
        assert_eq!(codes[0].card_type.as_deref(), Some("year"));
    }

    #[tokio::test]
    async fn custom_and_blank_labels() {
        let (engine, _) = engine();
        let custom = engine
            .generate(
                GenerateCodesParams {
                    amount: 1,
                    card_type: Some("promo".into()),
                    ..Default::default()
                },
                t0(),
            )
            .await
            .unwrap();
        assert_eq!(custom[0].card_type.as_deref(), Some("promo"));
        assert_eq!(custom[0].valid_days, None);

        let blank = engine
            .generate(
                GenerateCodesParams {
                    amount: 1,
                    card_type: Some("   ".into()),
                    ..Default::default()
                },
                t0(),
            )
            .await
            .unwrap();
        assert_eq!(blank[0].card_type, None);
    }

    #[tokio::test]
    async fn rejects_bad_amounts() {
        let (engine, stg) = engine();
        for amount in [0, 1001] {
            let err = engine.generate(params(amount), t0()).await.unwrap_err();
            assert!(matches!(err, EngineError::InvalidRequest(_)), "{amount}");
        }
        assert!(engine.generate(params(1000), t0()).await.is_ok());
        assert_eq!(
            stg.list_codes(&Default::default()).await.unwrap().items.len(),
            1000
        );
    }

    #[tokio::test]
    async fn rejects_conflicting_policy() {
        let (engine, stg) = engine();
        let err = engine
            .generate(
                GenerateCodesParams {
                    amount: 3,
                    expires_at: Some(t0() + TimeDelta::days(1)),
                    valid_days: Some(7),
                    card_type: None,
                },
                t0(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::InvalidRequest(_)));
        assert!(
            stg.list_codes(&Default::default())
                .await
                .unwrap()
                .items
                .is_empty()
        );
    }

    #[tokio::test]
    async fn rejects_deadline_not_in_future() {
        let (engine, _) = engine();
        for deadline in [t0(), t0() - TimeDelta::seconds(1)] {
            let err = engine
                .generate(
                    GenerateCodesParams {
                        amount: 1,
                        expires_at: Some(deadline),
                        ..Default::default()
                    },
                    t0(),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidRequest(_)));
        }
    }

    #[tokio::test]
    async fn redraws_only_colliding_tokens() {
        let (engine, stg) = engine();
        stg.insert_codes(vec![DbActivationCode::new(
            latch_db::models::DbUlid::new(),
            "TAKEN".into(),
            ValidityPolicy::Unbounded,
            None,
            t0(),
        )])
        .await
        .unwrap();

        let tokens = engine
            .unique_tokens(
                3,
                scripted(vec![vec!["A", "A", "TAKEN"], vec!["B", "A"], vec!["C"]]),
            )
            .await
            .unwrap();

        assert_eq!(tokens, ["A", "B", "C"]);
    }

    #[tokio::test]
    async fn gives_up_when_tokens_keep_colliding() {
        let (engine, _) = engine();
        let err = engine
            .unique_tokens(2, |_| vec!["SAME".to_string(), "SAME".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Conflict));
    }

    #[test]
    fn resolve_keeps_unlabelled_unbounded() {
        let request = BatchRequest::resolve(params(2), 10, t0()).unwrap();
        assert_eq!(
            request,
            BatchRequest {
                amount: 2,
                policy: ValidityPolicy::Unbounded,
                card_type: None,
            }
        );
    }
}
