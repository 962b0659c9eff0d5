use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use geo::LatLon;
use net::protocol::{Feature, FeatureCollection, Geometry};
use reconciler::{GeoReconciler, PassStart};
use region_db::RegionDb;
use relay::CommandChannel;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::{bearer_token, Claims, TokenVerifier};
use crate::error::ApiError;

/// Everything the HTTP handlers reach into.
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<GeoReconciler>,
    pub db: Arc<RegionDb>,
    pub commands: CommandChannel,
    pub verifier: Arc<dyn TokenVerifier>,
    pub admin_role: Arc<str>,
}

#[derive(Debug, Default, Deserialize)]
struct PassParams {
    #[serde(rename = "skipOld", default)]
    skip_old: bool,
}

#[derive(Debug, Deserialize)]
struct TeleportRequest {
    coords: [f64; 2],
}

#[derive(Debug, Serialize)]
struct RegionProperties {
    id: String,
    username: String,
    city: String,
}

pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/admin/recalculateBuildings", get(recalculate_buildings))
        .route("/admin/calculateProgress", get(calculate_progress))
        .route("/admin/getOsmDisplayNames", get(get_osm_display_names))
        .route("/admin/osmDisplayNameProgress", get(osm_display_name_progress))
        .route("/admin/syncWithSearchDB", get(sync_with_search_db))
        .route("/user/teleport", post(teleport))
        .route("/region/all/geojson", get(regions_geojson))
        .route("/health", get(health))
        .with_state(state)
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Claims, ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;
    state.verifier.verify(token).await.ok_or(ApiError::Unauthorized)
}

async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<Claims, ApiError> {
    let claims = authenticate(state, headers).await?;
    if !claims.has_role(&state.admin_role) {
        tracing::warn!(subject = %claims.subject, "admin route refused");
        return Err(ApiError::Forbidden(format!("role {} required", state.admin_role)));
    }
    Ok(claims)
}

fn pass_response(start: PassStart) -> Json<Value> {
    match start {
        // Detached; progress is polled separately.
        PassStart::Started { count, task: _ } => Json(json!({ "status": "ok", "count": count })),
        PassStart::AlreadyRunning => Json(json!({ "status": "already_started" })),
    }
}

async fn recalculate_buildings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PassParams>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, &headers).await?;
    let start = state.reconciler.calculate_all_buildings(params.skip_old).await?;
    Ok(pass_response(start))
}

async fn calculate_progress(State(state): State<AppState>, headers: HeaderMap) -> Result<String, ApiError> {
    require_admin(&state, &headers).await?;
    Ok(state.reconciler.buildings_progress().to_string())
}

async fn get_osm_display_names(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PassParams>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, &headers).await?;
    let start = state.reconciler.get_osm_display_names(params.skip_old).await?;
    Ok(pass_response(start))
}

async fn osm_display_name_progress(State(state): State<AppState>, headers: HeaderMap) -> Result<String, ApiError> {
    require_admin(&state, &headers).await?;
    Ok(state.reconciler.display_name_progress().to_string())
}

async fn sync_with_search_db(State(state): State<AppState>, headers: HeaderMap) -> Result<&'static str, ApiError> {
    require_admin(&state, &headers).await?;
    state.reconciler.sync_with_search_db().await?;
    Ok("ok")
}

async fn teleport(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TeleportRequest>,
) -> Result<Json<Value>, ApiError> {
    let claims = authenticate(&state, &headers).await?;
    let target = LatLon::from(request.coords);
    if !target.is_finite() {
        return Err(ApiError::BadRequest("coords must be finite".to_string()));
    }

    let subject = claims.subject.clone();
    let uuid = state
        .db
        .users(|u| u.linked_player_uuid(&subject))?
        .ok_or_else(|| ApiError::Forbidden("no linked game account".to_string()))?;

    state.commands.send_teleport_request(target, &uuid)?;
    tracing::info!(subject = %claims.subject, %uuid, "teleport requested");
    Ok(Json(json!({ "status": "ok" })))
}

async fn regions_geojson(State(state): State<AppState>) -> Result<Json<FeatureCollection<RegionProperties>>, ApiError> {
    let regions = state.db.regions(|r| r.all())?;
    let features = regions
        .into_iter()
        .map(|region| Feature {
            geometry: Geometry::Polygon {
                // GeoJSON order is [lon, lat].
                coordinates: vec![geo::close_ring(&region.vertices)
                    .into_iter()
                    .map(|p| [p.lon, p.lat])
                    .collect()],
            },
            properties: RegionProperties {
                id: region.id,
                username: region.username,
                city: region.city,
            },
        })
        .collect();
    Ok(Json(FeatureCollection::new(features)))
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenVerifier;
    use crate::config::TokenEntry;
    use reconciler::services::{build_client, HttpSettings, MeiliIndex, MeiliSettings, NominatimGeocoder, OverpassCounter};
    use reconciler::{Ports, RegionSnapshot};
    use reqwest::StatusCode;
    use std::time::Duration;

    struct Fixture {
        base: String,
        http: reqwest::Client,
        db: Arc<RegionDb>,
        output_rx: net::channels::OutputRx,
    }

    async fn fixture() -> Fixture {
        let db = Arc::new(RegionDb::open_memory().unwrap());
        // Unreachable services; only the search sync test calls out, and it must fail.
        let client = build_client(&HttpSettings {
            timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .unwrap();
        let ports = Ports {
            store: db.clone(),
            counter: Arc::new(OverpassCounter::new(client.clone(), "http://127.0.0.1:9", 1)),
            geocoder: Arc::new(NominatimGeocoder::new(client, "http://127.0.0.1:9")),
            search: Arc::new(
                MeiliIndex::new(MeiliSettings {
                    host: "http://127.0.0.1:9".into(),
                    api_key: None,
                    index: "regions".into(),
                    task_poll: Duration::from_millis(10),
                    task_timeout: Duration::from_millis(100),
                })
                .unwrap(),
            ),
        };
        let (output_tx, output_rx) = tokio::sync::mpsc::unbounded_channel();
        let verifier = StaticTokenVerifier::from_entries(&[
            TokenEntry {
                token: "admin-token".into(),
                subject: "sso-admin".into(),
                roles: vec!["mapadmin".into()],
            },
            TokenEntry {
                token: "user-token".into(),
                subject: "sso-user".into(),
                roles: vec![],
            },
        ]);
        let state = AppState {
            reconciler: Arc::new(GeoReconciler::new(ports, 10)),
            db: db.clone(),
            commands: CommandChannel::new(output_tx),
            verifier: Arc::new(verifier),
            admin_role: Arc::from("mapadmin"),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = api_routes(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Fixture {
            base: format!("http://{addr}"),
            http: reqwest::Client::new(),
            db,
            output_rx,
        }
    }

    impl Fixture {
        fn get(&self, path: &str, token: Option<&str>) -> reqwest::RequestBuilder {
            let request = self.http.get(format!("{}{}", self.base, path));
            match token {
                Some(t) => request.bearer_auth(t),
                None => request,
            }
        }

        fn teleport(&self, token: &str, body: Value) -> reqwest::RequestBuilder {
            self.http
                .post(format!("{}/user/teleport", self.base))
                .bearer_auth(token)
                .json(&body)
        }
    }

    #[tokio::test]
    async fn admin_routes_require_token() {
        let f = fixture().await;
        let response = f.get("/admin/calculateProgress", None).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = f
            .get("/admin/calculateProgress", Some("forged"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_routes_require_role() {
        let f = fixture().await;
        let response = f
            .get("/admin/calculateProgress", Some("user-token"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn idle_progress_reads_zero() {
        let f = fixture().await;
        let response = f
            .get("/admin/osmDisplayNameProgress", Some("admin-token"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "0");
    }

    #[tokio::test]
    async fn empty_pass_reports_zero_count() {
        let f = fixture().await;
        let response = f
            .get("/admin/recalculateBuildings?skipOld=true", Some("admin-token"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "status": "ok", "count": 0 }));
    }

    #[tokio::test]
    async fn search_sync_failure_is_500() {
        let f = fixture().await;
        let response = f
            .get("/admin/syncWithSearchDB", Some("admin-token"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn teleport_without_linked_account_is_forbidden() {
        let f = fixture().await;
        let response = f
            .teleport("user-token", json!({ "coords": [48.1, 11.5] }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn teleport_reaches_producer_group() {
        let mut f = fixture().await;
        f.db.users(|u| u.link("sso-user", "steve", "uuid-steve")).unwrap();

        let response = f
            .teleport("user-token", json!({ "coords": [48.1, 11.5] }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let out = f.output_rx.try_recv().unwrap();
        assert_eq!(
            out.target,
            session::OutputTarget::Group(session::ConnectionRole::Producer)
        );
        let frame: Value = serde_json::from_str(&out.text).unwrap();
        let data: Value = serde_json::from_str(frame["data"].as_str().unwrap()).unwrap();
        assert_eq!(data, json!({ "coords": [48.1, 11.5], "uuid": "uuid-steve" }));
    }

    #[tokio::test]
    async fn region_geojson_uses_lon_lat_and_closed_rings() {
        let f = fixture().await;
        f.db.regions(|r| {
            r.insert(&RegionSnapshot {
                id: "r1".into(),
                vertices: vec![
                    LatLon::new(48.0, 9.0),
                    LatLon::new(48.0, 9.5),
                    LatLon::new(48.5, 9.5),
                ],
                city: "Tübingen".into(),
                username: "builder".into(),
                buildings_count: 3,
                search_display_name: None,
            })
        })
        .unwrap();

        let body: Value = f
            .get("/region/all/geojson", None)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["type"], "FeatureCollection");
        let feature = &body["features"][0];
        assert_eq!(
            feature["properties"],
            json!({ "id": "r1", "username": "builder", "city": "Tübingen" })
        );
        assert_eq!(feature["geometry"]["type"], "Polygon");
        let ring = feature["geometry"]["coordinates"][0].as_array().unwrap();
        assert_eq!(ring.len(), 4);
        assert_eq!(ring[0], json!([9.0, 48.0]));
        assert_eq!(ring[0], ring[3]);
    }

    #[tokio::test]
    async fn health_is_public() {
        let f = fixture().await;
        let response = f.get("/health", None).send().await.unwrap();
        assert_eq!(response.text().await.unwrap(), "ok");
    }
}
