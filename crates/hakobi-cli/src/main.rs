use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hakobi_core::app::{Handler, TaskContext};
use hakobi_core::config::{TopicConfig, WorkerSettings};
use hakobi_core::domain::{HandlerResult, Variables, WorkerId};
use hakobi_core::impls::InMemoryEngine;
use hakobi_core::{LeaseClient, WorkerBuilder};

#[derive(Debug, Deserialize)]
struct InvoicePayload {
    invoice_id: String,
    amount: f64,
}

struct InvoiceHandler;

#[async_trait]
impl Handler<InvoicePayload> for InvoiceHandler {
    async fn handle(&self, ctx: TaskContext<InvoicePayload>) -> HandlerResult {
        if ctx.payload.amount < 0.0 {
            // 業務エラー：リトライしても直らない
            return HandlerResult::business_failure(
                "NEGATIVE_AMOUNT",
                format!("invoice {} has a negative amount", ctx.payload.invoice_id),
            );
        }
        sleep(Duration::from_millis(100)).await;
        info!(invoice = %ctx.payload.invoice_id, amount = ctx.payload.amount, "invoice processed");
        HandlerResult::completed_with(Variables::new().with("processed", true))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // (A) 開発用のインメモリエンジンを用意してタスクを投入
    let engine = Arc::new(InMemoryEngine::new(WorkerId::new("hakobi-demo")));
    engine
        .seed(
            "invoice",
            Variables::new()
                .with("invoice_id", "inv-001")
                .with("amount", 120.5),
            3,
        )
        .await;
    engine
        .seed(
            "invoice",
            Variables::new()
                .with("invoice_id", "inv-002")
                .with("amount", -4.0),
            3,
        )
        .await;

    // (B) worker を組み立てて起動
    let handle = WorkerBuilder::new(WorkerSettings::new("hakobi-demo"))
        .client(engine.clone() as Arc<dyn LeaseClient>)
        .handler("invoice", InvoiceHandler)?
        .subscribe(
            "invoice",
            TopicConfig {
                poll_interval: Duration::from_millis(200),
                ..TopicConfig::default()
            },
        )
        .build()?
        .start();

    // (C) 全タスクの完了か Ctrl-C を待つ
    let drained = async {
        loop {
            if engine.finished().await.len() >= 2 {
                break;
            }
            sleep(Duration::from_millis(100)).await;
        }
    };
    tokio::select! {
        _ = drained => info!("all seeded tasks reported"),
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
    }

    // (D) graceful shutdown：claim を止め、実行中タスクを待つ
    let stragglers = handle.shutdown_and_join().await;
    info!(stragglers, "worker stopped");

    for (id, disposition) in engine.finished().await {
        info!(task_id = %id, ?disposition, "final disposition");
    }
    Ok(())
}
