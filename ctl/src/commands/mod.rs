use std::io::Write;

use chrono::{DateTime, Utc};
use clap::Parser;
use latch_common::{
    params::{CardTypeFilter, CodeFilter, GenerateCodesParams},
    views::{ActivationCode, CodeStatus},
};
use latch_engine::Engine;

#[derive(Clone, Parser)]
pub struct GenerateParams {
    /// How many codes to generate
    #[clap(short = 'n', long, default_value_t = 1)]
    pub amount: u32,

    /// Deadline for redeeming the codes (RFC 3339)
    #[clap(long, conflicts_with = "valid_days")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Days each code stays valid once redeemed
    #[clap(long)]
    pub valid_days: Option<u32>,

    /// Preset (week, month, quarter, half-year, year) or custom label
    #[clap(short, long)]
    pub card_type: Option<String>,
}

#[derive(Clone, Parser)]
pub struct ListParams {
    /// Substring of the code or machine, any case
    #[clap(short, long)]
    pub search: Option<String>,

    /// unused, used or expired
    #[clap(long)]
    pub status: Option<CodeStatus>,

    /// Card label, or `none` for unlabelled codes
    #[clap(short, long)]
    pub card_type: Option<String>,
}

#[derive(Clone, Parser)]
pub struct RedeemParams {
    pub code: String,

    #[clap(short, long)]
    pub machine_id: String,
}

pub async fn generate(
    engine: &Engine,
    params: GenerateParams,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let codes = engine
        .generate(
            GenerateCodesParams {
                amount: params.amount,
                expires_at: params.expires_at,
                valid_days: params.valid_days,
                card_type: params.card_type,
            },
            Utc::now(),
        )
        .await?;

    for code in codes {
        writeln!(out, "{}", code.code)?;
    }
    Ok(())
}

pub async fn list(engine: &Engine, params: ListParams, out: &mut impl Write) -> anyhow::Result<()> {
    let filter = CodeFilter {
        search: params.search.filter(|s| !s.trim().is_empty()),
        status: params.status,
        card_type: params.card_type.as_deref().and_then(CardTypeFilter::parse),
    };

    let now = Utc::now();
    for code in engine.list(&filter, now).await? {
        writeln!(out, "{}", row(&code, now))?;
    }
    Ok(())
}

pub async fn delete(engine: &Engine, id: &str, out: &mut impl Write) -> anyhow::Result<()> {
    engine.delete(id).await?;
    writeln!(out, "Deleted code {id}")?;
    Ok(())
}

pub async fn redeem(
    engine: &Engine,
    params: RedeemParams,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let code = engine
        .redeem(&params.code, &params.machine_id, Utc::now())
        .await?;

    match code.effective_expiry() {
        Some(until) => writeln!(out, "Bound to {} until {until}", params.machine_id)?,
        None => writeln!(out, "Bound to {} permanently", params.machine_id)?,
    }
    Ok(())
}

pub async fn cleanup(engine: &Engine, out: &mut impl Write) -> anyhow::Result<()> {
    let report = engine.cleanup_expired_bindings(Utc::now()).await?;
    writeln!(
        out,
        "Released {} binding(s), skipped {}",
        report.removed_count, report.skipped
    )?;
    Ok(())
}

pub async fn stats(engine: &Engine, out: &mut impl Write) -> anyhow::Result<()> {
    let stats = engine.stats(Utc::now()).await?;
    writeln!(out, "total    {}", stats.total)?;
    writeln!(out, "active   {}", stats.active)?;
    writeln!(out, "used     {}", stats.used)?;
    writeln!(out, "expired  {}", stats.expired)?;
    if stats.skipped > 0 {
        writeln!(out, "skipped  {}", stats.skipped)?;
    }
    Ok(())
}

fn row(code: &ActivationCode, now: DateTime<Utc>) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}",
        code.id,
        code.code,
        code.status(now),
        code.card_label(),
        code.used_by.as_deref().unwrap_or("-"),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use latch_db::storage::memory::MemoryStorage;
    use latch_engine::EngineConfig;

    use super::*;

    fn engine() -> Engine {
        Engine::new(Arc::new(MemoryStorage::new()), EngineConfig::default())
    }

    fn lines(out: Vec<u8>) -> Vec<String> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn generate_redeem_list() {
        let engine = engine();

        let mut out = Vec::new();
        generate(
            &engine,
            GenerateParams {
                amount: 2,
                expires_at: None,
                valid_days: None,
                card_type: Some("week".into()),
            },
            &mut out,
        )
        .await
        .unwrap();
        let tokens = lines(out);
        assert_eq!(tokens.len(), 2);

        let mut out = Vec::new();
        redeem(
            &engine,
            RedeemParams {
                code: tokens[0].clone(),
                machine_id: "m1".into(),
            },
            &mut out,
        )
        .await
        .unwrap();
        assert!(lines(out)[0].starts_with("Bound to m1 until"));

        let mut out = Vec::new();
        list(
            &engine,
            ListParams {
                search: Some("M1".into()),
                status: None,
                card_type: None,
            },
            &mut out,
        )
        .await
        .unwrap();
        let rows = lines(out);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].contains(&tokens[0]));
        assert!(rows[0].ends_with("used\tweek\tm1"));
    }

    #[tokio::test]
    async fn stats_and_cleanup_output() {
        let engine = engine();
        let mut out = Vec::new();
        generate(
            &engine,
            GenerateParams {
                amount: 3,
                expires_at: None,
                valid_days: None,
                card_type: None,
            },
            &mut out,
        )
        .await
        .unwrap();

        let mut out = Vec::new();
        stats(&engine, &mut out).await.unwrap();
        assert_eq!(lines(out), ["total    3", "active   3", "used     0", "expired  0"]);

        let mut out = Vec::new();
        cleanup(&engine, &mut out).await.unwrap();
        assert_eq!(lines(out), ["Released 0 binding(s), skipped 0"]);
    }

    #[tokio::test]
    async fn delete_unknown_fails() {
        let mut out = Vec::new();
        assert!(delete(&engine(), "01JNB9Q7Z8X9C3V4B5N6M7K8J9", &mut out).await.is_err());
        assert!(out.is_empty());
    }
}
