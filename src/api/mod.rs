use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use clap::Parser;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    Currency, EngineError, Money, Percentage, Portfolio, RoundingPolicy, Simulation, WealthTax,
};

mod catalog;

pub use catalog::Combination;

const INDEX_HTML: &str = include_str!("../../web/index.html");
const STYLES_CSS: &str = include_str!("../../web/styles.css");
const APP_JS: &str = include_str!("../../web/app.js");

#[derive(Parser, Debug)]
#[command(
    name = "brokersim",
    about = "Deterministic cost comparison of index-fund brokers over a multi-year investment plan"
)]
struct Cli {
    #[arg(long, default_value_t = dec!(100), help = "Monthly contribution in euros")]
    monthly: Decimal,
    #[arg(
        long,
        help = "Initial contribution in euros; defaults to the monthly contribution"
    )]
    initial: Option<Decimal>,
    #[arg(long, default_value_t = 20, help = "Projection horizon in years")]
    years: u32,
    #[arg(
        long,
        default_value_t = dec!(7),
        help = "Expected annual return in percent"
    )]
    expected_return: Decimal,
    #[arg(
        long,
        default_value_t = dec!(2),
        help = "Expected annual dividend yield in percent"
    )]
    dividend_yield: Decimal,
    #[arg(
        long,
        default_value_t = false,
        help = "Only combinations that support automated periodic investing"
    )]
    automated_only: bool,
    #[arg(
        long,
        default_value_t = false,
        help = "Only portfolios with small-cap exposure"
    )]
    small_caps: bool,
    #[arg(
        long,
        default_value_t = false,
        help = "Emit the comparison as JSON instead of a table"
    )]
    json: bool,
}

#[derive(Debug)]
struct ComparisonParams {
    initial: Money,
    monthly: Money,
    years: u32,
    expected_return: Percentage,
    dividend_yield: Percentage,
    automated_only: bool,
    small_caps_only: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    monthly: Option<Decimal>,
    initial: Option<Decimal>,
    years: Option<u32>,
    #[serde(alias = "return")]
    expected_return: Option<Decimal>,
    dividend_yield: Option<Decimal>,
    automated_only: Option<bool>,
    small_caps: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CombinationResult {
    broker: String,
    product: String,
    url: String,
    funds: Vec<String>,
    automated_investing: bool,
    contains_small_caps: bool,
    portfolio_value: Decimal,
    net_result: Decimal,
    total_service_fees: Decimal,
    total_taxes_paid: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    years: u32,
    total_investment: Decimal,
    results: Vec<CombinationResult>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_params(cli: Cli) -> Result<ComparisonParams, String> {
    if cli.monthly.is_sign_negative() {
        return Err("--monthly must be >= 0".to_string());
    }
    let initial = cli.initial.unwrap_or(cli.monthly);
    if initial.is_sign_negative() {
        return Err("--initial must be >= 0".to_string());
    }
    if cli.years == 0 || cli.years > 100 {
        return Err("--years must be between 1 and 100".to_string());
    }
    if cli.expected_return.is_sign_negative() || cli.expected_return > dec!(100) {
        return Err("--expected-return must be between 0 and 100".to_string());
    }
    if cli.dividend_yield.is_sign_negative() || cli.dividend_yield > dec!(100) {
        return Err("--dividend-yield must be between 0 and 100".to_string());
    }

    Ok(ComparisonParams {
        initial: Money::new(initial, Currency::EUR),
        monthly: Money::new(cli.monthly, Currency::EUR),
        years: cli.years,
        expected_return: Percentage::new(cli.expected_return),
        dividend_yield: Percentage::new(cli.dividend_yield),
        automated_only: cli.automated_only,
        small_caps_only: cli.small_caps,
    })
}

fn default_cli_for_api() -> Cli {
    Cli {
        monthly: dec!(100),
        initial: None,
        years: 20,
        expected_return: dec!(7),
        dividend_yield: dec!(2),
        automated_only: false,
        small_caps: false,
        json: false,
    }
}

fn params_from_payload(payload: SimulatePayload) -> Result<ComparisonParams, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.monthly {
        cli.monthly = v;
    }
    if let Some(v) = payload.initial {
        cli.initial = Some(v);
    }
    if let Some(v) = payload.years {
        cli.years = v;
    }
    if let Some(v) = payload.expected_return {
        cli.expected_return = v;
    }
    if let Some(v) = payload.dividend_yield {
        cli.dividend_yield = v;
    }
    if let Some(v) = payload.automated_only {
        cli.automated_only = v;
    }
    if let Some(v) = payload.small_caps {
        cli.small_caps = v;
    }

    build_params(cli)
}

#[cfg(test)]
fn params_from_json(json: &str) -> Result<ComparisonParams, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    params_from_payload(payload)
}

fn compare_combinations(params: &ComparisonParams) -> Result<SimulateResponse, EngineError> {
    let wealth_tax = WealthTax::dutch_box3()?;
    let policy = RoundingPolicy::default();
    let mut results = Vec::new();

    for combination in catalog::combinations()? {
        if params.automated_only && !combination.automated_investing {
            continue;
        }
        if params.small_caps_only && !combination.contains_small_caps() {
            continue;
        }

        let portfolio = Portfolio::new(combination.allocations.clone(), Currency::EUR)?;
        let funds = portfolio
            .funds()
            .map(|fund| fund.name().to_string())
            .collect();
        let contains_small_caps = portfolio.contains_small_caps();

        let mut simulation = Simulation::new(
            &wealth_tax,
            &combination.broker,
            portfolio,
            params.initial,
            params.monthly,
            params.expected_return,
            params.dividend_yield,
        )?;
        // A plan can be incompatible with a single combination, e.g. a
        // contribution below the broker's transaction fee. That drops the
        // combination from the ranking instead of failing the comparison.
        if let Err(e) = simulation.run(params.years) {
            match e {
                EngineError::InvalidParameter(reason) => {
                    tracing::warn!(
                        broker = combination.broker.name(),
                        "combination left out of the comparison: {reason}"
                    );
                    continue;
                }
                other => return Err(other),
            }
        }

        results.push(CombinationResult {
            broker: combination.broker.name().to_string(),
            product: combination.broker.product().to_string(),
            url: combination.broker.url().to_string(),
            funds,
            automated_investing: combination.automated_investing,
            contains_small_caps,
            portfolio_value: simulation.portfolio_value().rounded(policy).amount(),
            net_result: simulation.net_result()?.rounded(policy).amount(),
            total_service_fees: simulation.total_service_fees().rounded(policy).amount(),
            total_taxes_paid: simulation.total_taxes_paid().rounded(policy).amount(),
        });
    }

    results.sort_by(|a, b| b.net_result.cmp(&a.net_result));

    let months = Decimal::from(12 * params.years) - Decimal::ONE;
    let total_investment = params.initial.amount() + params.monthly.amount() * months;

    Ok(SimulateResponse {
        years: params.years,
        total_investment,
        results,
    })
}

pub fn run_comparison() -> Result<(), String> {
    let cli = Cli::parse();
    let as_json = cli.json;
    let params = build_params(cli)?;
    let response = compare_combinations(&params).map_err(|e| e.to_string())?;

    if as_json {
        let body = serde_json::to_string_pretty(&response).map_err(|e| e.to_string())?;
        println!("{body}");
        return Ok(());
    }

    println!(
        "Total investment over {} years: {} EUR",
        response.years, response.total_investment
    );
    println!();
    println!(
        "{:<16} {:<22} {:>14} {:>12} {:>10} {:>10}",
        "Broker", "Product", "End value", "Net result", "Fees", "Tax"
    );
    for result in &response.results {
        println!(
            "{:<16} {:<22} {:>14} {:>12} {:>10} {:>10}",
            result.broker,
            result.product,
            result.portfolio_value,
            result.net_result,
            result.total_service_fees,
            result.total_taxes_paid
        );
    }
    Ok(())
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/styles.css", get(styles_handler))
        .route("/app.js", get(app_js_handler))
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("broker comparison listening on http://{addr}");
    axum::serve(listener, app).await
}

async fn index_handler() -> impl IntoResponse {
    with_cache_control(Html(INDEX_HTML))
}

async fn styles_handler() -> impl IntoResponse {
    with_cache_control((
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        STYLES_CSS,
    ))
}

async fn app_js_handler() -> impl IntoResponse {
    with_cache_control((
        [(
            header::CONTENT_TYPE,
            "application/javascript; charset=utf-8",
        )],
        APP_JS,
    ))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let params = match params_from_payload(payload) {
        Ok(params) => params,
        Err(msg) => {
            tracing::warn!("rejected simulate request: {msg}");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    match compare_combinations(&params) {
        Ok(response) => {
            tracing::info!(
                years = response.years,
                results = response.results.len(),
                "simulate request served"
            );
            json_response(StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("simulation failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, "no-store".parse().expect("valid header"));
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
