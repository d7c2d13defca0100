use fund_portfolio_advisor::agents::create_default_agents;
use fund_portfolio_advisor::audit::{compute_context_hash, OptimizationAudit};
use fund_portfolio_advisor::catalog::InMemoryCatalog;
use fund_portfolio_advisor::config::AdvisorConfig;
use fund_portfolio_advisor::context::ContextField;
use fund_portfolio_advisor::coordinator::{next_pending, Coordinator};
use fund_portfolio_advisor::error::AdvisorError;
use fund_portfolio_advisor::llm::{LanguageModel, OfflineLanguageModel};
use fund_portfolio_advisor::memory::{HistoryWindow, TurnRecord};
use fund_portfolio_advisor::state::{InMemorySessionStore, SessionStore};
use fund_portfolio_advisor::{
    AgentKind, AssetClass, Context, Currency, Geography, GeographyAllocation, Objective, RiskBucket,
};
use std::sync::Arc;

fn coordinator(store: Arc<dyn SessionStore>) -> Coordinator {
    let llm: Arc<dyn LanguageModel> = Arc::new(OfflineLanguageModel);
    let agents = create_default_agents(
        llm.clone(),
        Arc::new(InMemoryCatalog::seeded()),
        &AdvisorConfig::default(),
    );
    Coordinator::new(
        agents,
        store,
        llm,
        Arc::new(OptimizationAudit::new()),
        HistoryWindow::new(),
    )
}

/// HIGH bucket, five debt and five equity USD funds, 80/20 split
fn high_bucket_context(session_id: &str) -> Context {
    let mut context = Context::new(session_id);
    context.currency = Some(Currency::Usd);
    context.geography_constraints = [
        Geography::Usa,
        Geography::Japan,
        Geography::India,
        Geography::Europe,
    ]
    .into_iter()
    .map(|geography| GeographyAllocation {
        geography,
        share: 0.25,
    })
    .collect();
    context.risk_bucket = Some(RiskBucket::High);
    context.sub_risk_targets = Some(RiskBucket::High.median_targets());
    context.fund_count_targets = RiskBucket::High.default_fund_counts(false);
    context.selected_funds = [
        "usd-vanguard-total-bond",
        "usd-fidelity-us-bond",
        "usd-nomura-japan-bond",
        "usd-franklin-india-bond",
        "usd-europe-aggregate-bond",
        "usd-vanguard-sp500",
        "usd-vanguard-midcap",
        "usd-vanguard-smallcap",
        "usd-franklin-india-bluechip",
        "usd-nikko-japan-equity",
    ]
    .iter()
    .map(|id| id.to_string())
    .collect();
    context.asset_split = [(AssetClass::Equity, 0.8), (AssetClass::Debt, 0.2)]
        .into_iter()
        .collect();
    context
}

#[tokio::test]
async fn scenario_unset_currency_routes_to_currency_agent() {
    let coordinator = coordinator(Arc::new(InMemorySessionStore::new()));
    let before = Context::new("s1");

    let outcome = coordinator
        .step(before.clone(), "I want to invest for growth")
        .await
        .unwrap();

    assert_eq!(outcome.agents, vec![AgentKind::Currency]);
    assert!(outcome.reply.contains("INR") && outcome.reply.contains("USD"));

    let mut after = outcome.context.clone();
    assert_eq!(after.turn_history.len(), 2);
    after.turn_history = before.turn_history.clone();
    after.updated_at = before.updated_at;
    assert_eq!(after, before);
}

#[tokio::test]
async fn scenario_usd_markets_then_risk_assessment() {
    let coordinator = coordinator(Arc::new(InMemorySessionStore::new()));
    let mut context = Context::new("s2");
    context.currency = Some(Currency::Usd);

    let outcome = coordinator.step(context, "USA and India").await.unwrap();

    assert_eq!(outcome.agents, vec![AgentKind::Geography]);
    let markets: Vec<Geography> = outcome
        .context
        .geography_constraints
        .iter()
        .map(|g| g.geography)
        .collect();
    assert_eq!(markets, vec![Geography::Usa, Geography::India]);
    assert_eq!(next_pending(&outcome.context), Some(AgentKind::RiskAssessment));
}

#[tokio::test]
async fn scenario_high_bucket_meets_debt_target() {
    let coordinator = coordinator(Arc::new(InMemorySessionStore::new()));
    let context = high_bucket_context("s3");

    let outcome = coordinator.step(context.clone(), "go ahead").await.unwrap();

    assert_eq!(outcome.agents, vec![AgentKind::Optimization]);
    assert!(outcome.optimization_triggered);
    let result = outcome.context.optimization_result.expect("optimization result");
    assert_eq!(result.objective, Objective::MaxReturn);
    assert_eq!(result.weights.len(), 10);
    assert!((result.total_weight() - 1.0).abs() < 1e-6);
    for entry in &result.weights {
        assert!((0.0..=1.0).contains(&entry.weight));
    }

    let debt: f64 = result
        .weights
        .iter()
        .filter(|w| w.fund_id.ends_with("bond"))
        .map(|w| w.weight)
        .sum();
    assert!((debt - 0.2).abs() < 1e-6, "debt weight {}", debt);
}

#[tokio::test]
async fn scenario_invalid_split_never_reaches_engine() {
    let store = Arc::new(InMemorySessionStore::new());
    let coordinator = coordinator(store.clone());
    let mut context = high_bucket_context("s4");
    context.asset_split = [(AssetClass::Equity, 0.5), (AssetClass::Debt, 0.6)]
        .into_iter()
        .collect();

    let outcome = coordinator.step(context.clone(), "go ahead").await.unwrap();
    assert!(outcome.context.optimization_result.is_none());
    assert!(!outcome.new_allocation);
    assert!(outcome.reply.contains("asset_split"));

    let turn = TurnRecord::new("s4", "", "", Vec::new(), false);
    store.save("s4", &context, &turn).await.unwrap();
    match coordinator.optimize("s4").await {
        Err(AdvisorError::Validation(reason)) => assert!(reason.contains("asset_split")),
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(store.load("s4").await.unwrap().unwrap().optimization_result.is_none());
}

#[tokio::test]
async fn full_usd_session_is_monotonic_and_persisted() {
    let store = Arc::new(InMemorySessionStore::new());
    let coordinator = coordinator(store.clone());
    let session = "full";

    let fields = [
        ContextField::Currency,
        ContextField::GeographyConstraints,
        ContextField::RiskBucket,
        ContextField::SubRiskTargets,
        ContextField::SelectedFunds,
        ContextField::OptimizationResult,
    ];
    let mut set_so_far: Vec<ContextField> = Vec::new();
    let mut last = None;

    for message in [
        "Hi, I want to invest for growth",
        "USD",
        "USA and India",
        "I'd hold and wait",
        "the middle is fine",
    ] {
        let response = coordinator.chat(session, message).await.unwrap();
        let context = coordinator.payload(session).await.unwrap();

        for field in &set_so_far {
            assert!(context.is_set(*field), "{} was cleared by {:?}", field, message);
        }
        set_so_far = fields.iter().copied().filter(|f| context.is_set(*f)).collect();
        last = Some(response);
    }

    let last = last.unwrap();
    assert!(last.optimization_triggered);
    assert_eq!(last.agent, Some(AgentKind::Optimization));
    let portfolio = last.portfolio.expect("portfolio in final reply");
    assert!((portfolio.total_weight() - 1.0).abs() < 1e-6);

    let context = coordinator.payload(session).await.unwrap();
    assert_eq!(context.risk_bucket, Some(RiskBucket::Medium));
    assert_eq!(context.turn_history.len(), 10);
    assert_eq!(store.turns(session).await.unwrap().len(), 5);

    let trail = coordinator.audit_trail(session).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].record.context_hash, compute_context_hash(&context));
    assert!(trail[0].matches_current_context);

    coordinator.reset(session).await.unwrap();
    let trail = coordinator.audit_trail(session).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert!(!trail[0].matches_current_context);
}

#[tokio::test]
async fn sessions_do_not_share_context() {
    let coordinator = coordinator(Arc::new(InMemorySessionStore::new()));
    coordinator.chat("a", "INR").await.unwrap();
    coordinator.chat("b", "USD").await.unwrap();

    assert_eq!(coordinator.payload("a").await.unwrap().currency, Some(Currency::Inr));
    assert_eq!(coordinator.payload("b").await.unwrap().currency, Some(Currency::Usd));
    assert_eq!(next_pending(&coordinator.payload("b").await.unwrap()), Some(AgentKind::Geography));
}
