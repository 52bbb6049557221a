use super::*;
use crate::testing::{tenant_config, ScriptedTransport};
use serde_json::json;
use tempfile::tempdir;

const LISTING: &str = "residential-units/UNIT42/consumptions/periods";

fn portal() -> ScriptedTransport {
    ScriptedTransport::new()
        .route(
            LISTING,
            200,
            json!({ "data": [{ "period": "2024-05" }, { "period": "2024-06" }] }).to_string(),
        )
        .route(
            "residential-units/UNIT42/consumptions/2024-05",
            200,
            json!({ "kind": "own", "period": "2024-05" }).to_string(),
        )
        .route(
            "statistics/residential-units/UNIT42/consumptions/2024-05/average",
            200,
            json!({ "kind": "average", "period": "2024-05" }).to_string(),
        )
        .route(
            "residential-units/UNIT42/consumptions/2024-06",
            200,
            json!({ "kind": "own", "period": "2024-06" }).to_string(),
        )
        .route(
            "statistics/residential-units/UNIT42/consumptions/2024-06/average",
            200,
            json!({ "kind": "average", "period": "2024-06" }).to_string(),
        )
}

#[test]
fn test_list_periods_requests_first_page() {
    let config = tenant_config();
    let transport = portal();
    let harvester = Harvester::new(&transport, &config).unwrap();

    let listing = harvester.list_periods("UNIT42", "TOKEN").unwrap();

    let periods: Vec<&str> = listing.periods.iter().map(Period::as_str).collect();
    assert_eq!(periods, vec!["2024-05", "2024-06"]);
    assert_eq!(
        transport.urls(),
        vec![
            "https://mieter.techem.de/api/v1/consumptions/residential-units/UNIT42/consumptions/periods?limit=100"
        ]
    );
}

#[test]
fn test_requests_carry_bearer_and_browser_headers() {
    let config = tenant_config();
    let transport = portal();
    let harvester = Harvester::new(&transport, &config).unwrap();

    harvester.list_periods("UNIT42", "TOKEN").unwrap();

    let call = &transport.calls()[0];
    assert_eq!(call.method, "GET");
    assert_eq!(call.header("authorization"), Some("Bearer TOKEN"));
    assert_eq!(call.header("Accept"), Some("application/json"));
    assert_eq!(call.header("User-Agent"), Some(config.user_agent.as_str()));
}

#[test]
fn test_period_documents_use_distinct_endpoints() {
    let config = tenant_config();
    let transport = portal();
    let harvester = Harvester::new(&transport, &config).unwrap();
    let period = Period::parse("2024-05").unwrap();

    let own = harvester
        .fetch_period_consumption("UNIT42", &period, "TOKEN")
        .unwrap();
    let average = harvester
        .fetch_period_average("UNIT42", &period, "TOKEN")
        .unwrap();

    assert_eq!(own["kind"], "own");
    assert_eq!(average["kind"], "average");
    assert_eq!(
        transport.urls(),
        vec![
            "https://mieter.techem.de/api/v1/consumptions/residential-units/UNIT42/consumptions/2024-05",
            "https://mieter.techem.de/api/v1/consumptions/statistics/residential-units/UNIT42/consumptions/2024-05/average",
        ]
    );
}

#[test]
fn test_unit_id_is_percent_encoded() {
    let config = tenant_config();
    let transport = ScriptedTransport::new().route("consumptions", 200, r#"{"data":[]}"#);
    let harvester = Harvester::new(&transport, &config).unwrap();

    harvester.list_periods("A/B C", "TOKEN").unwrap();

    assert!(transport.urls()[0].contains("/residential-units/A%2FB%20C/consumptions/periods"));
}

#[test]
fn test_harvest_fetches_consumption_before_average() {
    let config = tenant_config();
    let transport = portal();
    let harvester = Harvester::new(&transport, &config).unwrap();
    let dir = tempdir().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();

    let outcome = harvester.harvest("UNIT42", "TOKEN", &store).unwrap();

    let urls = transport.urls();
    assert_eq!(urls.len(), 5);
    assert!(urls[0].contains("consumptions/periods"));
    assert!(urls[1].ends_with("/consumptions/2024-05"));
    assert!(urls[2].ends_with("/consumptions/2024-05/average"));
    assert!(urls[3].ends_with("/consumptions/2024-06"));
    assert!(urls[4].ends_with("/consumptions/2024-06/average"));

    let names: Vec<String> = outcome
        .artifacts
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "periods.json",
            "2024-05.json",
            "2024-05-average.json",
            "2024-06.json",
            "2024-06-average.json",
        ]
    );
    assert_eq!(outcome.periods.len(), 2);
}

#[test]
fn test_harvest_twice_produces_same_artifacts() {
    let config = tenant_config();
    let dir = tempdir().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let names = [
        "periods.json",
        "2024-05.json",
        "2024-05-average.json",
        "2024-06.json",
        "2024-06-average.json",
    ];
    let read_all = || -> Vec<String> {
        names
            .iter()
            .map(|name| std::fs::read_to_string(dir.path().join(name)).unwrap())
            .collect()
    };

    let first_transport = portal();
    Harvester::new(&first_transport, &config)
        .unwrap()
        .harvest("UNIT42", "TOKEN", &store)
        .unwrap();
    let first = read_all();

    let second_transport = portal();
    Harvester::new(&second_transport, &config)
        .unwrap()
        .harvest("UNIT42", "TOKEN", &store)
        .unwrap();

    assert_eq!(read_all(), first);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 5);
}

#[test]
fn test_failure_keeps_earlier_artifacts() {
    let config = tenant_config();
    let transport = ScriptedTransport::new()
        .route(
            LISTING,
            200,
            json!({ "data": [{ "period": "2024-05" }] }).to_string(),
        )
        .route(
            "residential-units/UNIT42/consumptions/2024-05",
            200,
            r#"{"kind":"own"}"#,
        )
        .route(
            "statistics/residential-units/UNIT42/consumptions/2024-05/average",
            503,
            "Service Unavailable",
        );
    let harvester = Harvester::new(&transport, &config).unwrap();
    let dir = tempdir().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();

    let err = harvester.harvest("UNIT42", "TOKEN", &store).unwrap_err();

    assert!(matches!(err, HarvestError::Network { .. }));
    assert!(err.to_string().contains("HTTP 503"));
    assert!(dir.path().join("periods.json").exists());
    assert!(dir.path().join("2024-05.json").exists());
    assert!(!dir.path().join("2024-05-average.json").exists());
}

#[test]
fn test_non_json_document_is_malformed() {
    let config = tenant_config();
    let transport = ScriptedTransport::new().route(LISTING, 200, "<html>maintenance</html>");
    let harvester = Harvester::new(&transport, &config).unwrap();

    let err = harvester.list_periods("UNIT42", "TOKEN").unwrap_err();

    assert!(matches!(err, HarvestError::MalformedResponse { .. }));
}

#[test]
fn test_oversized_listing_warns_without_fetching_more() {
    let config = tenant_config();
    let entries: Vec<Value> = (0..101)
        .map(|i| json!({ "period": format!("p{:03}", i) }))
        .collect();
    let transport = ScriptedTransport::new().route(
        LISTING,
        200,
        json!({ "data": entries, "links": { "next": "?page=2" } }).to_string(),
    );
    let harvester = Harvester::new(&transport, &config).unwrap();

    let listing = harvester.list_periods("UNIT42", "TOKEN").unwrap();

    assert_eq!(listing.periods.len(), 101);
    assert_eq!(transport.calls().len(), 1);
}

#[test]
fn test_unexpected_listing_shape_is_still_written() {
    let config = tenant_config();
    let transport = ScriptedTransport::new().route(
        LISTING,
        200,
        json!({ "items": [{ "period": "2024-05" }] }).to_string(),
    );
    let harvester = Harvester::new(&transport, &config).unwrap();
    let dir = tempdir().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();

    let err = harvester.harvest("UNIT42", "TOKEN", &store).unwrap_err();

    assert!(matches!(err, HarvestError::MalformedResponse { .. }));
    let written: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("periods.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(written["items"][0]["period"], "2024-05");
    assert_eq!(transport.calls().len(), 1);
}
