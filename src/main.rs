//! Order Intake Simulation.
//!
//! Drives the intake service end to end against in-memory collaborators:
//! build, sign, place, cancel, leveraged orders and margin account health.

use dex_intake::memory::InMemoryBackend;
use dex_intake::*;
use ethers::signers::{LocalWallet, Signer};
use rust_decimal_macros::dec;
use std::error::Error;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

type SimResult = Result<(), Box<dyn Error>>;

struct Sim {
    backend: InMemoryBackend,
    clock: Arc<ManualClock>,
    service: Arc<ExchangeService>,
    market: Market,
}

impl Sim {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_700_000_000)));
        let backend = InMemoryBackend::new(clock.clone());
        let market = Market::eth_usdc();
        backend.catalog.add_market(market.clone());

        let config = Environment::Development.config();
        let service = Arc::new(ExchangeService::new(config, backend.collaborators()));
        Self {
            backend,
            clock,
            service,
            market,
        }
    }

    fn funded_trader(&self) -> LocalWallet {
        let wallet = LocalWallet::new(&mut rand::thread_rng());
        let balances = &self.backend.balances;
        balances.fund(&self.market.quote_token, wallet.address(), dec!(100_000));
        balances.fund(&self.market.base_token, wallet.address(), dec!(50));
        wallet
    }
}

async fn sign(wallet: &LocalWallet, id: &Fingerprint) -> Result<String, Box<dyn Error>> {
    Ok(wallet.sign_message(id.as_bytes()).await?.to_string())
}

#[tokio::main]
async fn main() -> SimResult {
    init_logging();

    println!("DEX Order Intake Simulation");
    println!("Build, Stage, Sign, Place\n");

    scenario_1_spot_lifecycle().await?;
    scenario_2_notional_floor().await?;
    scenario_3_leveraged_orders().await?;
    scenario_4_staging_expiry().await?;
    scenario_5_double_placement().await?;
    scenario_6_cancellation().await?;
    scenario_7_margin_account().await?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,dex_intake=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Build, sign and place a spot limit order.
async fn scenario_1_spot_lifecycle() -> SimResult {
    println!("Scenario 1: Spot Order Lifecycle\n");
    let sim = Sim::new();
    let alice = sim.funded_trader();

    let request = OrderRequest::limit(sim.market.id.clone(), Side::Buy, dec!(1850.25), dec!(0.5));
    let built = sim.service.build_order(&request, alice.address()).await?;
    println!("  Alice builds BUY 0.5 ETH @ 1850.25");
    println!("  Order id: {}", built.id);
    println!(
        "  Taker fee {} + gas {} = {}",
        built.fee.taker_fee_amount, built.fee.gas_fee_amount, built.fee.as_taker_total_fee_amount
    );

    let signature = sign(&alice, &built.id).await?;
    let order = sim
        .service
        .place_order(&built.id.to_hex(), alice.address(), &signature)
        .await?;
    println!("  Placed with status {:?}", order.status);

    let events = sim.backend.queue.events(&sim.market.id);
    println!(
        "  Engine queue holds {} event(s), first is {:?}\n",
        events.len(),
        events.first().map(|e| e.kind)
    );
    Ok(())
}

/// Orders below the market's minimum notional are rejected.
async fn scenario_2_notional_floor() -> SimResult {
    println!("Scenario 2: Minimum Order Size\n");
    let sim = Sim::new();
    let bob = sim.funded_trader();

    let small = OrderRequest::limit(sim.market.id.clone(), Side::Buy, dec!(9), dec!(1));
    match sim.service.build_order(&small, bob.address()).await {
        Err(err) => println!("  1 ETH @ 9 rejected: {}", ApiError::from(err).code),
        Ok(_) => println!("  1 ETH @ 9 unexpectedly accepted"),
    }

    let enough = OrderRequest::limit(sim.market.id.clone(), Side::Buy, dec!(9), dec!(2));
    let built = sim.service.build_order(&enough, bob.address()).await?;
    println!("  2 ETH @ 9 accepted as {}\n", built.id);
    Ok(())
}

/// Leveraged orders split into collateral and loan, bounded by 1 + 1/L.
async fn scenario_3_leveraged_orders() -> SimResult {
    println!("Scenario 3: Leveraged Orders\n");
    let sim = Sim::new();
    let carol = sim.funded_trader();
    println!(
        "  Liquidation rate {} caps leverage below {}",
        sim.market.liquidation_rate,
        max_leverage(sim.market.liquidation_rate).round_dp(4)
    );

    let long = OrderRequest::limit(sim.market.id.clone(), Side::Buy, dec!(1500), dec!(2))
        .with_margin(dec!(1.5), "USDC");
    let built = sim.service.build_order(&long, carol.address()).await?;
    if let Some(margin) = &built.margin {
        println!("  Long 2 ETH @ 1500 at 1.5x");
        println!(
            "    collateral {} {} + borrowed {} {}",
            margin.collateral_value, margin.collateral_asset, margin.borrow_value, margin.borrow_asset
        );
        if let Some(liq) = margin.liquidation_price {
            println!("    liquidation price {}", liq);
        }
    }

    let signature = sign(&carol, &built.id).await?;
    sim.service
        .place_order(&built.id.to_hex(), carol.address(), &signature)
        .await?;
    let events = sim.backend.queue.events(&sim.market.id);
    println!("  Placed as {:?}", events.first().map(|e| e.kind));

    let too_far = OrderRequest::limit(sim.market.id.clone(), Side::Sell, dec!(1500), dec!(2))
        .with_margin(dec!(2), "USDC");
    match sim.service.build_order(&too_far, carol.address()).await {
        Err(err) => println!("  Short at 2x rejected: {}\n", err),
        Ok(_) => println!("  Short at 2x unexpectedly accepted\n"),
    }
    Ok(())
}

/// Staged orders vanish after their ttl.
async fn scenario_4_staging_expiry() -> SimResult {
    println!("Scenario 4: Staging Expiry\n");
    let sim = Sim::new();
    let dave = sim.funded_trader();

    let request = OrderRequest::limit(sim.market.id.clone(), Side::Sell, dec!(2000), dec!(1));
    let built = sim.service.build_order(&request, dave.address()).await?;
    let signature = sign(&dave, &built.id).await?;

    sim.clock.advance_secs(61);
    println!("  61 seconds pass before Dave signs");
    match sim
        .service
        .place_order(&built.id.to_hex(), dave.address(), &signature)
        .await
    {
        Err(err) => println!("  Placement rejected: {}\n", ApiError::from(err).code),
        Ok(_) => println!("  Placement unexpectedly succeeded\n"),
    }
    Ok(())
}

/// Two concurrent placements of the same order: one wins.
async fn scenario_5_double_placement() -> SimResult {
    println!("Scenario 5: Concurrent Placement\n");
    let sim = Sim::new();
    let erin = sim.funded_trader();

    let request = OrderRequest::limit(sim.market.id.clone(), Side::Buy, dec!(1900), dec!(1));
    let built = sim.service.build_order(&request, erin.address()).await?;
    let signature = sign(&erin, &built.id).await?;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let service = sim.service.clone();
        let id = built.id.to_hex();
        let signature = signature.clone();
        let trader = erin.address();
        handles.push(tokio::spawn(async move {
            service.place_order(&id, trader, &signature).await
        }));
    }

    let mut placed = 0;
    for handle in handles {
        if handle.await?.is_ok() {
            placed += 1;
        }
    }
    println!("  {} of 2 placements succeeded", placed);
    println!("  Engine queue holds {} event(s)\n", sim.backend.queue.total());
    Ok(())
}

/// Only pending orders produce a cancel event.
async fn scenario_6_cancellation() -> SimResult {
    println!("Scenario 6: Cancellation\n");
    let sim = Sim::new();
    let frank = sim.funded_trader();

    let mut ids = Vec::new();
    for price in [dec!(1700), dec!(1750)] {
        let request = OrderRequest::limit(sim.market.id.clone(), Side::Buy, price, dec!(1));
        let built = sim.service.build_order(&request, frank.address()).await?;
        let signature = sign(&frank, &built.id).await?;
        sim.service
            .place_order(&built.id.to_hex(), frank.address(), &signature)
            .await?;
        ids.push(built.id);
    }
    // the engine would persist these
    sim.backend.orders.ingest(&sim.backend.queue.events(&sim.market.id));
    sim.backend.orders.set_status(&ids[1], OrderStatus::Confirmed);

    let pending = sim.service.cancel_order(&ids[0].to_hex()).await?;
    let confirmed = sim.service.cancel_order(&ids[1].to_hex()).await?;
    println!("  Cancel pending order: {:?}", pending);
    println!("  Cancel confirmed order: {:?}", confirmed);

    let page = sim
        .service
        .get_orders(frank.address(), None, None, None, None)
        .await?;
    println!("  Frank still has {} pending order(s)\n", page.count);
    Ok(())
}

/// Account health across leveraged positions, then collateral top-up and repayment.
async fn scenario_7_margin_account() -> SimResult {
    println!("Scenario 7: Margin Account Health\n");
    let sim = Sim::new();
    let grace = sim.funded_trader();

    let position = MarginPosition {
        market_id: sim.market.id.clone(),
        base_asset_symbol: "ETH".to_string(),
        quote_asset_symbol: "USDC".to_string(),
        side: PositionSide::Long,
        leverage: dec!(1.5),
        position_size_asset_units: dec!(2),
        position_size_usd: Quote::new(dec!(3000)),
        entry_price: Price::new_unchecked(dec!(1500)),
        current_mark_price: Price::new_unchecked(dec!(1450)),
        collateral_amount: dec!(2000),
        collateral_asset_symbol: "USDC".to_string(),
        collateral_value_usd: Quote::new(dec!(2000)),
        borrowed_amount: dec!(1000),
        borrowed_asset_symbol: "USDC".to_string(),
        borrowed_value_usd: Quote::new(dec!(1000)),
        accrued_interest: dec!(1.25),
        current_liquidation_price: Price::new(dec!(600)),
        unrealized_pnl: Quote::new(dec!(-100)),
        liquidation_rate: sim.market.liquidation_rate,
    };
    sim.backend
        .positions
        .set_positions(grace.address(), vec![position]);

    let summary = sim
        .service
        .margin_account_summary(grace.address(), MarketFilter::All)
        .await?;
    println!("  Collateral {}, borrowed {}", summary.total_collateral_value, summary.total_borrowed_value);
    println!("  Leverage {}, maintenance {}", summary.account_leverage.round_dp(4), summary.maintenance_margin_required);
    println!("  Free collateral {}, health {:?}", summary.free_collateral, summary.account_health_ratio);

    let tx = sim
        .service
        .add_collateral(grace.address(), &sim.market.id, "USDC", dec!(500))
        .await?;
    println!("  Added 500 USDC collateral in tx {:?}", tx);
    let tx = sim
        .service
        .repay_loan(grace.address(), &sim.market.id, "USDC", dec!(250))
        .await?;
    println!("  Repaid 250 USDC in tx {:?}", tx);

    let locked = sim.service.locked_balances(grace.address()).await?;
    println!("  Locked balances tracked for {} tokens", locked.len());
    Ok(())
}
