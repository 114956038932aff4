use bridge_config::{AnyOrArray, CorsConfig};
use http::{HeaderValue, Method};
use http::header::HeaderName;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

/// Build a Tower CORS layer from configuration
///
/// Entries that fail to parse are skipped.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_origin(match &config.origins {
            AnyOrArray::Any => AllowOrigin::any(),
            AnyOrArray::List(origins) => AllowOrigin::list(parse_all::<HeaderValue>(origins)),
        })
        .allow_methods(match &config.methods {
            AnyOrArray::Any => AllowMethods::any(),
            AnyOrArray::List(methods) => AllowMethods::list(parse_all::<Method>(methods)),
        })
        .allow_headers(match &config.headers {
            AnyOrArray::Any => AllowHeaders::any(),
            AnyOrArray::List(headers) => AllowHeaders::list(parse_all::<HeaderName>(headers)),
        });

    let layer = if config.credentials {
        layer.allow_credentials(true)
    } else {
        layer
    };

    match config.max_age_duration() {
        Some(max_age) => layer.max_age(max_age),
        None => layer,
    }
}

fn parse_all<T: std::str::FromStr>(values: &[String]) -> Vec<T> {
    values
        .iter()
        .filter_map(|value| match value.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!(%value, "ignoring unparseable CORS entry");
                None
            }
        })
        .collect()
}
