//! Demo: one run from planning to completion, including a shortage that has
//! to be reconciled before the goods are handed out.

use group_run::catalog::StaticCatalog;
use group_run::events::{EventBus, LogEventHandler};
use group_run::lifecycle::{setup_tracing, RunSystem};
use group_run::model::{GroupId, ProductId, StoreId, UserId};
use group_run::RunError;
use tracing::{info, Instrument};

const GROUP: GroupId = GroupId(1);
const STORE: StoreId = StoreId(1);
const RICE: ProductId = ProductId(1);
const OIL: ProductId = ProductId(2);
const LEADER: UserId = UserId(1);
const ALICE: UserId = UserId(2);
const BOB: UserId = UserId(3);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();

    let catalog = StaticCatalog::new()
        .with_store(STORE, "Costco")
        .with_product(RICE, "Rice 10kg")
        .with_product(OIL, "Olive oil 3l")
        .with_user(LEADER, "Lee")
        .with_user(ALICE, "Alice")
        .with_user(BOB, "Bob")
        .with_member(GROUP, LEADER)
        .with_member(GROUP, ALICE)
        .with_member(GROUP, BOB);
    let system = RunSystem::new(catalog, EventBus::new().with_handler(LogEventHandler));

    let run_id = async {
        let run = system.orchestrator.create_run(GROUP, STORE, LEADER).await?;
        let id = run.run.id;
        let orch = &system.orchestrator;
        orch.place_bid(id, ALICE, RICE, 2.0, false, None).await?;
        orch.place_bid(id, BOB, RICE, 1.0, false, None).await?;
        orch.place_bid(id, BOB, OIL, 1.0, false, Some("any brand".into())).await?;
        for user in [LEADER, ALICE, BOB] {
            orch.toggle_ready(id, user).await?;
        }
        Ok::<_, RunError>(id)
    }
    .instrument(tracing::info_span!("planning"))
    .await?;

    let orch = &system.orchestrator;
    async {
        orch.start_shopping(run_id, LEADER).await?;
        // The store only had two bags of rice.
        orch.record_purchase(run_id, LEADER, RICE, 2.0, 18.50, None).await?;
        orch.record_purchase(run_id, LEADER, OIL, 1.0, 12.99, None).await?;
        let outcome = orch.complete_shopping(run_id, LEADER).await?;
        for mismatch in &outcome.mismatches {
            info!(%mismatch, "Needs adjusting");
        }
        Ok::<_, RunError>(())
    }
    .instrument(tracing::info_span!("shopping"))
    .await?;

    async {
        orch.place_bid(run_id, BOB, RICE, 0.0, false, None).await?;
        orch.finish_adjusting(run_id, LEADER, false).await?;

        for user in orch.distribution_view(run_id, LEADER).await? {
            info!(user = %user.user_name, total = %user.total, "Owes");
            for line in user.lines {
                info!(
                    product = %line.product_name,
                    quantity = %line.distributed_quantity,
                    subtotal = %line.subtotal,
                    "  takes"
                );
                orch.mark_picked_up(run_id, LEADER, line.bid_id).await?;
            }
        }
        orch.complete_distribution(run_id, LEADER).await?;
        Ok::<_, RunError>(())
    }
    .instrument(tracing::info_span!("distribution"))
    .await?;

    system.shutdown().await?;
    info!("Application completed successfully");
    Ok(())
}
