mod cli;

use axum::{
    Router,
    extract::{Json, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::core::{
    Child, CostTable, DestinationCost, PlanError, PlanOutcome, PlanRequest, PlanningAssumptions,
    SUMMARY_FILE_NAME, render_summary, run_plan,
};

pub use cli::{AssumptionArgs, Cli, Command, ConfigArgs, PlanArgs, run};

const INDEX_HTML: &str = include_str!("../../web/index.html");
const STYLES_CSS: &str = include_str!("../../web/styles.css");
const APP_JS: &str = include_str!("../../web/app.js");

/// Immutable configuration shared by every request.
#[derive(Debug, Clone, Default)]
pub struct ServerState {
    pub assumptions: PlanningAssumptions,
    pub costs: CostTable,
}

/// Percent-valued assumption overrides as they arrive from the page or the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AssumptionOverrides {
    pub return_rate: Option<f64>,
    pub cost_growth: Option<f64>,
    pub study_years: Option<u32>,
    pub university_age: Option<u32>,
    pub safety_buffer: Option<u32>,
}

impl AssumptionOverrides {
    pub fn apply(self, base: PlanningAssumptions) -> PlanningAssumptions {
        PlanningAssumptions {
            return_rate: self.return_rate.map_or(base.return_rate, |v| v / 100.0),
            cost_growth_rate: self.cost_growth.map_or(base.cost_growth_rate, |v| v / 100.0),
            study_years: self.study_years.unwrap_or(base.study_years),
            university_entry_age: self.university_age.unwrap_or(base.university_entry_age),
            safety_buffer_years: self.safety_buffer.unwrap_or(base.safety_buffer_years),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChildPayload {
    age: i64,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PlanPayload {
    children: Option<Vec<ChildPayload>>,
    ages: Option<String>,
    names: Option<String>,
    country: Option<String>,
    hybrid_initial: Option<f64>,

    return_rate: Option<f64>,
    cost_growth: Option<f64>,
    study_years: Option<u32>,
    university_age: Option<u32>,
    safety_buffer: Option<u32>,
}

#[derive(Debug)]
struct ApiRequest {
    assumptions: PlanningAssumptions,
    plan: PlanRequest,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    #[serde(flatten)]
    pub outcome: PlanOutcome,
    pub reference_year: u32,
    pub assumptions: PlanningAssumptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DestinationsResponse<'a> {
    reference_year: u32,
    target_readiness_age: u32,
    destinations: &'a [DestinationCost],
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Computes a plan and tags it with the assumptions and cost-table year it used.
pub fn build_plan_response(
    assumptions: &PlanningAssumptions,
    costs: &CostTable,
    request: &PlanRequest,
) -> Result<PlanResponse, PlanError> {
    let outcome = run_plan(assumptions, costs, request)?;
    Ok(PlanResponse {
        outcome,
        reference_year: costs.reference_year,
        assumptions: *assumptions,
    })
}

pub fn app(state: ServerState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/styles.css", get(styles_handler))
        .route("/app.js", get(app_js_handler))
        .route("/api/plan", get(plan_get_handler).post(plan_post_handler))
        .route(
            "/api/summary",
            get(summary_get_handler).post(summary_post_handler),
        )
        .route("/api/destinations", get(destinations_handler))
        .fallback(not_found_handler)
        .with_state(Arc::new(state))
}

pub async fn run_http_server(port: u16, state: ServerState) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("education planner listening on http://{addr}");
    info!("local access: http://127.0.0.1:{port}/");

    axum::serve(listener, app(state)).await
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

async fn destinations_handler(State(state): State<Arc<ServerState>>) -> Response {
    json_response(
        StatusCode::OK,
        DestinationsResponse {
            reference_year: state.costs.reference_year,
            target_readiness_age: state.assumptions.target_readiness_age(),
            destinations: &state.costs.destinations,
        },
    )
}

async fn plan_get_handler(
    State(state): State<Arc<ServerState>>,
    Query(payload): Query<PlanPayload>,
) -> Response {
    plan_handler_impl(&state, payload)
}

async fn plan_post_handler(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<PlanPayload>,
) -> Response {
    plan_handler_impl(&state, payload)
}

async fn summary_get_handler(
    State(state): State<Arc<ServerState>>,
    Query(payload): Query<PlanPayload>,
) -> Response {
    summary_handler_impl(&state, payload)
}

async fn summary_post_handler(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<PlanPayload>,
) -> Response {
    summary_handler_impl(&state, payload)
}

fn plan_handler_impl(state: &ServerState, payload: PlanPayload) -> Response {
    let request = match api_request_from_payload(payload, &state.assumptions) {
        Ok(request) => request,
        Err(msg) => return rejected(&msg),
    };

    match build_plan_response(&request.assumptions, &state.costs, &request.plan) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(e) => plan_error_response(&e),
    }
}

fn summary_handler_impl(state: &ServerState, payload: PlanPayload) -> Response {
    let request = match api_request_from_payload(payload, &state.assumptions) {
        Ok(request) => request,
        Err(msg) => return rejected(&msg),
    };

    let outcome = match run_plan(&request.assumptions, &state.costs, &request.plan) {
        Ok(outcome) => outcome,
        Err(e) => return plan_error_response(&e),
    };

    info!(
        "exporting summary for {} child(ren), {}",
        outcome.children.len(),
        outcome.country
    );
    with_cache_control((
        [
            (
                header::CONTENT_TYPE,
                "text/plain; charset=utf-8".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{SUMMARY_FILE_NAME}\""),
            ),
        ],
        render_summary(&outcome),
    ))
}

fn rejected(msg: &str) -> Response {
    warn!("rejected plan request: {msg}");
    error_response(StatusCode::BAD_REQUEST, msg)
}

/// Caller mistakes are 400s; configuration and encoding failures are 500s.
fn plan_error_response(err: &PlanError) -> Response {
    if err.is_invalid_input() {
        return rejected(&err.to_string());
    }
    error!("plan request failed: {err}");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
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

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<PlanPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload, &PlanningAssumptions::default())
}

fn api_request_from_payload(
    payload: PlanPayload,
    base: &PlanningAssumptions,
) -> Result<ApiRequest, String> {
    let overrides = AssumptionOverrides {
        return_rate: payload.return_rate,
        cost_growth: payload.cost_growth,
        study_years: payload.study_years,
        university_age: payload.university_age,
        safety_buffer: payload.safety_buffer,
    };
    let assumptions = overrides.apply(*base);
    assumptions.validate().map_err(|e| e.to_string())?;

    let mut plan = PlanRequest::default();
    if let Some(children) = payload.children {
        plan.children = children
            .into_iter()
            .map(|c| -> Result<Child, String> {
                Ok(Child::new(
                    child_age(c.age, &assumptions)?,
                    c.name.unwrap_or_default(),
                ))
            })
            .collect::<Result<_, String>>()?;
    } else if let Some(ages) = payload.ages {
        let names: Vec<&str> = payload
            .names
            .as_deref()
            .map(|n| n.split(',').map(str::trim).collect())
            .unwrap_or_default();
        plan.children = parse_age_list(&ages)?
            .into_iter()
            .enumerate()
            .map(|(idx, age)| -> Result<Child, String> {
                let name = names.get(idx).copied().unwrap_or_default();
                Ok(Child::new(child_age(age, &assumptions)?, name))
            })
            .collect::<Result<_, String>>()?;
    }

    if let Some(country) = payload.country {
        plan.country = country;
    }
    if let Some(v) = payload.hybrid_initial {
        plan.hybrid_initial = v;
    }

    Ok(ApiRequest { assumptions, plan })
}

fn parse_age_list(raw: &str) -> Result<Vec<i64>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| format!("ages must be whole numbers, got {s:?}"))
        })
        .collect()
}

fn child_age(age: i64, assumptions: &PlanningAssumptions) -> Result<u32, String> {
    u32::try_from(age).map_err(|_| {
        PlanError::AgeOutOfRange {
            age,
            max: assumptions.max_child_age(),
        }
        .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FundingResult;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn send(request: Request<Body>) -> Response {
        app(ServerState::default())
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        String::from_utf8(bytes.to_vec()).expect("body should be utf-8")
    }

    fn post_json(uri: &str, json: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .expect("valid request")
    }

    #[test]
    fn empty_payload_uses_page_defaults() {
        let request = api_request_from_json("{}").expect("json should parse");
        assert_eq!(request.assumptions, PlanningAssumptions::default());
        assert_eq!(request.plan.children, vec![Child::new(6, "")]);
        assert_eq!(request.plan.country, "United States");
        assert_eq!(request.plan.hybrid_initial, 0.0);
    }

    #[test]
    fn api_request_from_json_parses_web_keys() {
        let json = r#"{
          "children": [{"age": 4, "name": "Ana"}, {"age": 12}],
          "country": "Singapore",
          "hybridInitial": 25000,
          "returnRate": 8,
          "costGrowth": 5,
          "studyYears": 3,
          "universityAge": 19,
          "safetyBuffer": 1
        }"#;
        let request = api_request_from_json(json).expect("json should parse");

        assert_eq!(
            request.plan.children,
            vec![Child::new(4, "Ana"), Child::new(12, "")]
        );
        assert_eq!(request.plan.country, "Singapore");
        assert_eq!(request.plan.hybrid_initial, 25_000.0);
        assert!((request.assumptions.return_rate - 0.08).abs() < 1e-12);
        assert!((request.assumptions.cost_growth_rate - 0.05).abs() < 1e-12);
        assert_eq!(request.assumptions.study_years, 3);
        assert_eq!(request.assumptions.target_readiness_age(), 18);
    }

    #[test]
    fn age_list_pairs_with_names() {
        let payload = PlanPayload {
            ages: Some("6, 9,".to_string()),
            names: Some("Ana".to_string()),
            ..PlanPayload::default()
        };
        let request = api_request_from_payload(payload, &PlanningAssumptions::default())
            .expect("valid payload");
        assert_eq!(
            request.plan.children,
            vec![Child::new(6, "Ana"), Child::new(9, "")]
        );
    }

    #[test]
    fn negative_age_is_rejected() {
        let err = api_request_from_json(r#"{"children": [{"age": -1}]}"#)
            .expect_err("must reject negative age");
        assert!(err.contains("child age -1"));

        let err = api_request_from_payload(
            PlanPayload {
                ages: Some("6,x".to_string()),
                ..PlanPayload::default()
            },
            &PlanningAssumptions::default(),
        )
        .expect_err("must reject non-numeric age");
        assert!(err.contains("whole numbers"));
    }

    #[test]
    fn invalid_assumption_override_is_rejected() {
        let err = api_request_from_json(r#"{"studyYears": 0}"#).expect_err("must reject");
        assert!(err.contains("studyYears"));
    }

    #[test]
    fn plan_response_serialization_contains_expected_fields() {
        let request = api_request_from_json(r#"{"hybridInitial": 100000}"#).expect("valid");
        let response =
            build_plan_response(&request.assumptions, &CostTable::default(), &request.plan)
                .expect("valid plan");

        assert_eq!(response.outcome.schedule.len(), 10);
        assert_eq!(
            response.outcome.total,
            FundingResult {
                total_future_cost: 910_340,
                required_lump_sum: 225_022,
                required_annual_contribution: 44_836,
                required_hybrid_annual_top_up: 24_911,
            }
        );

        let json = serde_json::to_string(&response).expect("response should serialize");
        for key in [
            "\"country\"",
            "\"targetReadinessAge\"",
            "\"children\"",
            "\"displayName\"",
            "\"total\"",
            "\"totalFutureCost\"",
            "\"requiredLumpSum\"",
            "\"requiredAnnualContribution\"",
            "\"requiredHybridAnnualTopUp\"",
            "\"referenceYear\"",
            "\"schedule\"",
            "\"hybridBalance\"",
        ] {
            assert!(json.contains(key), "missing {key} in {json}");
        }
    }

    #[test]
    fn unknown_country_surfaces_as_error() {
        let request = api_request_from_json(r#"{"country": "Atlantis"}"#).expect("parses");
        let err = build_plan_response(&request.assumptions, &CostTable::default(), &request.plan)
            .expect_err("unknown country");
        assert!(matches!(err, PlanError::UnknownCountry(_)));
    }

    #[test]
    fn assumption_overrides_convert_percent() {
        let overrides = AssumptionOverrides {
            return_rate: Some(7.5),
            ..AssumptionOverrides::default()
        };
        let applied = overrides.apply(PlanningAssumptions::default());
        assert!((applied.return_rate - 0.075).abs() < 1e-12);
        assert_eq!(applied.cost_growth_rate, 0.10);
        assert_eq!(applied.safety_buffer_years, 2);
    }

    #[test]
    fn unbounded_overrides_are_rejected_before_planning() {
        let err = api_request_from_json(
            r#"{"children":[{"age":0},{"age":0}],"costGrowth":1000,"universityAge":100}"#,
        )
        .expect_err("1000% growth is out of range");
        assert!(err.contains("costGrowthRate"));

        let err = api_request_from_json(r#"{"children":[{"age":5}],"universityAge":4000}"#)
            .expect_err("entry age 4000 is out of range");
        assert!(err.contains("universityEntryAge"));

        let err = api_request_from_json(r#"{"studyYears":4000000000}"#)
            .expect_err("study years out of range");
        assert!(err.contains("studyYears"));
    }

    #[test]
    fn oversized_figures_surface_as_invalid_assumption() {
        let request = api_request_from_json(
            r#"{"children":[{"age":0},{"age":0}],"costGrowth":100,"universityAge":100}"#,
        )
        .expect("overrides are individually in range");
        let err = build_plan_response(&request.assumptions, &CostTable::default(), &request.plan)
            .expect_err("figures too large to plan");
        assert!(matches!(err, PlanError::InvalidAssumption(_)));
    }

    #[test]
    fn plan_errors_map_to_client_or_server_status() {
        let bad_input = plan_error_response(&PlanError::UnknownCountry("Atlantis".to_string()));
        assert_eq!(bad_input.status(), StatusCode::BAD_REQUEST);

        let config = plan_error_response(&PlanError::io(
            "reading cost_table.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        ));
        assert_eq!(config.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let table = plan_error_response(&PlanError::InvalidCostTable("empty".to_string()));
        assert_eq!(table.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn summary_route_downloads_uncached_attachment() {
        let response = send(
            Request::get("/api/summary?ages=6&names=Ana&hybridInitial=100000")
                .body(Body::empty())
                .expect("valid request"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"Education_Planning_Summary.txt\""
        );
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");

        let text = body_text(response).await;
        assert!(text.contains("- Ana, Age: 6"));
        assert!(text.contains("Hybrid Strategy: Initial USD 100,000, Additional USD 24,911 / year"));
    }

    #[tokio::test]
    async fn plan_route_returns_uncached_json() {
        let response = send(post_json("/api/plan", r#"{"children":[{"age":6}]}"#)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        let json: serde_json::Value =
            serde_json::from_str(&body_text(response).await).expect("json body");
        assert_eq!(json["total"]["totalFutureCost"], 910_340);
        assert_eq!(json["schedule"].as_array().map(Vec::len), Some(10));
        assert_eq!(json["referenceYear"], 2025);
    }

    #[tokio::test]
    async fn plan_route_rejects_out_of_range_assumptions() {
        for body in [
            r#"{"children":[{"age":0},{"age":0}],"costGrowth":1000,"universityAge":100}"#,
            r#"{"children":[{"age":5}],"universityAge":4000}"#,
            r#"{"children":[{"age":0},{"age":0}],"costGrowth":100,"universityAge":100}"#,
        ] {
            let response = send(post_json("/api/plan", body)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
            let json: serde_json::Value =
                serde_json::from_str(&body_text(response).await).expect("json body");
            let error = json["error"].as_str().unwrap_or_default();
            assert!(error.contains("invalid assumption"), "{error}");
        }
    }

    #[tokio::test]
    async fn unknown_route_returns_json_not_found() {
        let response = send(
            Request::get("/no/such/page")
                .body(Body::empty())
                .expect("valid request"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        let json: serde_json::Value =
            serde_json::from_str(&body_text(response).await).expect("json body");
        assert_eq!(json["error"], "Not found");
    }
}
