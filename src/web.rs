use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;

use async_graphql::http::GraphiQLSource;
use async_graphql_warp::{GraphQLBadRequest, GraphQLResponse};
use tracing::{error, info, warn};
use warp::{http::StatusCode, Filter, Rejection, Reply};

use crate::booking::raw_from_form;
use crate::error::PredictError;
use crate::graphql::Schema;
use crate::page::{self, Banner, FormValues};
use crate::predictor::Predictor;

/// Form submissions are a few hundred bytes; anything larger is refused.
const MAX_FORM_BYTES: u64 = 16 * 1024;

pub async fn serve(
    schema: Schema,
    predictor: Predictor,
    addr: SocketAddr,
    tls: Option<(PathBuf, PathBuf)>,
) {
    let routes = routes(schema, predictor);
    match tls {
        Some((cert, key)) => {
            info!("Serving on https://{addr}");
            warp::serve(routes)
                .tls()
                .cert_path(cert)
                .key_path(key)
                .run(addr)
                .await;
        }
        None => {
            info!("Serving on http://{addr}");
            warp::serve(routes).run(addr).await;
        }
    }
}

pub fn routes(
    schema: Schema,
    predictor: Predictor,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let graphiql = warp::path("graphql")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::html(GraphiQLSource::build().endpoint("/graphql").finish()));

    let graphql_post = warp::path("graphql")
        .and(warp::path::end())
        .and(warp::post())
        .and(async_graphql_warp::graphql(schema))
        .and_then(
            |(schema, request): (Schema, async_graphql::Request)| async move {
                Ok::<_, Infallible>(GraphQLResponse::from(schema.execute(request).await))
            },
        );

    let form_page = warp::path::end()
        .and(warp::get())
        .map(|| warp::reply::html(page::render(&page::default_values(), None)));

    let form_submit = warp::path::end()
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_FORM_BYTES))
        .and(warp::body::form::<FormValues>())
        .and(warp::any().map(move || predictor.clone()))
        .and_then(submit_form);

    graphiql
        .or(graphql_post)
        .or(form_page)
        .or(form_submit)
        .recover(handle_rejection)
}

async fn submit_form(values: FormValues, predictor: Predictor) -> Result<impl Reply, Infallible> {
    let raw = raw_from_form(values.iter().map(|(name, value)| (name.as_str(), value.as_str())));
    let banner = match predictor.predict_async(&raw).await {
        Ok(outcome) => {
            info!("{}", outcome.message());
            Banner::Outcome(outcome)
        }
        Err(PredictError::Schema(e)) => {
            warn!("Rejected form submission: {e}");
            Banner::Invalid(e.to_string())
        }
        Err(PredictError::Inference(e)) => {
            error!("Prediction failed: {e}");
            Banner::Unavailable
        }
    };
    Ok(warp::reply::html(page::render(&values, Some(&banner))))
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(GraphQLBadRequest(e)) = err.find() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "payload too large".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        warn!("Unhandled rejection: {err:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        )
    };
    Ok(warp::reply::with_status(message, status))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::graphql;
    use crate::predictor::tests::{predictor_with_score, CountingEncoder, FixedOutputs};

    fn app(predictor: Predictor) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
        routes(graphql::schema(predictor.clone()), predictor)
    }

    async fn post_form(predictor: Predictor, values: &FormValues) -> (StatusCode, String) {
        let res = warp::test::request()
            .method("POST")
            .path("/")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(serde_urlencoded::to_string(values).unwrap())
            .reply(&app(predictor))
            .await;
        (
            res.status(),
            String::from_utf8(res.body().to_vec()).unwrap(),
        )
    }

    #[tokio::test]
    async fn form_page() {
        let res = warp::test::request()
            .method("GET")
            .path("/")
            .reply(&app(predictor_with_score(0.5)))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = String::from_utf8(res.body().to_vec()).unwrap();
        assert!(body.contains("Predict Cancellation"));
        assert!(body.contains("name=\"customer_type\""));
    }

    #[tokio::test]
    async fn submit_canceled() {
        let mut values = page::default_values();
        values.insert("lead_time".to_string(), "320".to_string());
        let (status, body) = post_form(predictor_with_score(0.82), &values).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("banner error"));
        assert!(body.contains("Likely to be CANCELED (82.00% probability)"));
        assert!(body.contains("value=\"320\""));
    }

    #[tokio::test]
    async fn submit_round_trips_encoded_values() {
        let values = page::default_values();
        assert_eq!(values["distribution_channel"], "TA/TO");
        assert_eq!(values["market_segment"], "Online TA");
        let (_, body) = post_form(predictor_with_score(0.3), &values).await;
        assert!(body.contains("<option value=\"TA/TO\" selected>TA/TO</option>"));
        assert!(body.contains("<option value=\"Online TA\" selected>Online TA</option>"));
        assert!(body.contains("Likely to be NOT CANCELED (70.00% probability)"));
    }

    #[tokio::test]
    async fn submit_not_canceled() {
        let values = page::default_values();
        let (_, body) = post_form(predictor_with_score(0.1), &values).await;
        assert!(body.contains("banner success"));
        assert!(body.contains("Likely to be NOT CANCELED (90.00% probability)"));
    }

    #[tokio::test]
    async fn submit_invalid_form() {
        let mut values = page::default_values();
        values.insert("adults".to_string(), "11".to_string());
        let (status, body) = post_form(predictor_with_score(0.82), &values).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Prediction unavailable: field `adults` is out of range"));
        assert!(!body.contains("Likely to be"));
    }

    #[tokio::test]
    async fn submit_with_failing_classifier() {
        let predictor = Predictor::new(
            Arc::new(CountingEncoder::default()),
            Arc::new(FixedOutputs(vec![0.2, 0.8])),
        );
        let (_, body) = post_form(predictor, &page::default_values()).await;
        assert!(body.contains("Prediction unavailable. Please try again later."));
        assert!(!body.contains("Likely to be"));
        assert!(!body.contains("classifier returned"));
    }

    #[tokio::test]
    async fn graphql_over_http() {
        let res = warp::test::request()
            .method("POST")
            .path("/graphql")
            .header("content-type", "application/json")
            .json(&json!({ "query": "{ bookingFields { name } }" }))
            .reply(&app(predictor_with_score(0.5)))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["data"]["bookingFields"][0]["name"], json!("hotel"));
        assert_eq!(
            body["data"]["bookingFields"].as_array().map(Vec::len),
            Some(22)
        );
    }

    #[tokio::test]
    async fn graphiql_page() {
        let res = warp::test::request()
            .method("GET")
            .path("/graphql")
            .reply(&app(predictor_with_score(0.5)))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path() {
        let res = warp::test::request()
            .method("GET")
            .path("/bookings")
            .reply(&app(predictor_with_score(0.5)))
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
