use async_graphql::{
    Context, EmptyMutation, EmptySubscription, Enum, InputObject, Object, Result, SimpleObject,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::booking::{FieldKind, FieldSpec, FormColumn, FIELDS, MONTH_NAMES};
use crate::error::PredictError;
use crate::predictor::{CancellationLabel, Predictor};

/// Shown to clients instead of the details of a failed inference.
pub(crate) const PREDICTION_UNAVAILABLE: &str = "prediction unavailable";

#[derive(Default)]
pub struct Query;

pub type Schema = async_graphql::Schema<Query, EmptyMutation, EmptySubscription>;

/// A booking to score.
///
/// Categorical fields take the exact option strings listed by `bookingFields`.
#[derive(InputObject, Serialize, Debug)]
pub struct BookingInput {
    hotel: String,
    lead_time: i32,
    arrival_date_month: i32,
    arrival_date_week_number: i32,
    arrival_date_day_of_month: i32,
    stays_in_weekend_nights: i32,
    stays_in_week_nights: i32,
    adults: i32,
    children: i32,
    babies: i32,
    is_repeated_guest: i32,
    previous_cancellations: i32,
    previous_bookings_not_canceled: i32,
    required_car_parking_spaces: i32,
    total_of_special_requests: i32,
    adr: f64,
    meal: String,
    market_segment: String,
    distribution_channel: String,
    reserved_room_type: String,
    deposit_type: String,
    customer_type: String,
}

#[derive(SimpleObject)]
pub struct Prediction {
    label: CancellationLabel,
    /// Confidence in `label`, in percent.
    probability_percent: f64,
    /// The outcome as shown on the form.
    message: String,
    predicted_at: String,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
enum BookingFieldKind {
    Integer,
    Flag,
    Month,
    Decimal,
    Choice,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
enum FormSide {
    Left,
    Right,
}

#[derive(SimpleObject)]
struct BookingField {
    name: String,
    label: String,
    side: FormSide,
    kind: BookingFieldKind,
    /// Lower bound of numeric fields. (inclusive)
    min: Option<f64>,
    /// Upper bound of numeric fields. (inclusive)
    max: Option<f64>,
    default: String,
    /// Display names of the accepted values, for fields picked from a list.
    options: Vec<String>,
}

impl From<&FieldSpec> for BookingField {
    #[allow(clippy::cast_precision_loss)]
    fn from(spec: &FieldSpec) -> Self {
        let (kind, bounds, options) = match spec.kind {
            FieldKind::Integer { min, max, .. } => (
                BookingFieldKind::Integer,
                Some((min as f64, max as f64)),
                Vec::new(),
            ),
            FieldKind::Flag => (
                BookingFieldKind::Flag,
                Some((0.0, 1.0)),
                vec!["0".to_string(), "1".to_string()],
            ),
            FieldKind::Month => (
                BookingFieldKind::Month,
                Some((1.0, 12.0)),
                MONTH_NAMES.iter().map(ToString::to_string).collect(),
            ),
            FieldKind::Decimal { min, max, .. } => {
                (BookingFieldKind::Decimal, Some((min, max)), Vec::new())
            }
            FieldKind::Choice { options } => (
                BookingFieldKind::Choice,
                None,
                options.iter().map(ToString::to_string).collect(),
            ),
        };
        let default = match spec.kind.default_value() {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Self {
            name: spec.name.to_string(),
            label: spec.label.to_string(),
            side: match spec.column {
                FormColumn::Left => FormSide::Left,
                FormColumn::Right => FormSide::Right,
            },
            kind,
            min: bounds.map(|(min, _)| min),
            max: bounds.map(|(_, max)| max),
            default,
            options,
        }
    }
}

#[Object]
impl Query {
    /// Predicts whether a booking is likely to be canceled.
    async fn predict(&self, ctx: &Context<'_>, booking: BookingInput) -> Result<Prediction> {
        let predictor = ctx.data::<Predictor>()?;
        let Value::Object(raw) = serde_json::to_value(&booking)? else {
            return Err("booking must be an object".into());
        };
        match predictor.predict_async(&raw).await {
            Ok(outcome) => Ok(Prediction {
                label: outcome.label,
                probability_percent: outcome.probability_percent,
                message: outcome.message(),
                predicted_at: Utc::now().to_rfc3339(),
            }),
            Err(PredictError::Schema(e)) => {
                warn!("Rejected booking: {e}");
                Err(e.into())
            }
            Err(PredictError::Inference(e)) => {
                error!("Prediction failed: {e}");
                Err(PREDICTION_UNAVAILABLE.into())
            }
        }
    }

    /// The booking fields in column order, with their domains and form defaults.
    async fn booking_fields(&self) -> Vec<BookingField> {
        FIELDS.iter().map(BookingField::from).collect()
    }
}

pub fn schema(predictor: Predictor) -> Schema {
    Schema::build(Query, EmptyMutation, EmptySubscription)
        .data(predictor)
        .finish()
}

#[cfg(test)]
struct TestSchema {
    schema: Schema,
}

#[cfg(test)]
impl TestSchema {
    fn new(predictor: Predictor) -> Self {
        Self {
            schema: schema(predictor),
        }
    }

    async fn execute(&self, query: &str) -> async_graphql::Response {
        let request: async_graphql::Request = query.into();
        self.schema.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::TestSchema;
    use crate::predictor::tests::{predictor_with_score, CountingEncoder, FixedOutputs};
    use crate::predictor::Predictor;

    fn predict_query(lead_time: i32, hotel: &str) -> String {
        format!(
            r#"
            {{
                predict(booking: {{
                    hotel: "{hotel}",
                    leadTime: {lead_time},
                    arrivalDateMonth: 6,
                    arrivalDateWeekNumber: 20,
                    arrivalDateDayOfMonth: 15,
                    staysInWeekendNights: 1,
                    staysInWeekNights: 2,
                    adults: 2,
                    children: 0,
                    babies: 0,
                    isRepeatedGuest: 0,
                    previousCancellations: 0,
                    previousBookingsNotCanceled: 0,
                    requiredCarParkingSpaces: 0,
                    totalOfSpecialRequests: 0,
                    adr: 100.0,
                    meal: "BB",
                    marketSegment: "Online TA",
                    distributionChannel: "TA/TO",
                    reservedRoomType: "A",
                    depositType: "No Deposit",
                    customerType: "Transient"
                }}) {{
                    label
                    message
                    predictedAt
                }}
            }}"#
        )
    }

    #[tokio::test]
    async fn predict_canceled() {
        let schema = TestSchema::new(predictor_with_score(0.82));
        let res = schema.execute(&predict_query(50, "City Hotel")).await;
        assert!(res.errors.is_empty(), "{:?}", res.errors);

        let data = res.data.into_json().unwrap();
        assert_eq!(data["predict"]["label"], json!("CANCELED"));
        assert_eq!(
            data["predict"]["message"],
            json!("Likely to be CANCELED (82.00% probability)")
        );
        assert!(data["predict"]["predictedAt"].is_string());
    }

    #[tokio::test]
    async fn predict_not_canceled() {
        let schema = TestSchema::new(predictor_with_score(0.1));
        let res = schema.execute(&predict_query(50, "Resort Hotel")).await;
        let data = res.data.into_json().unwrap();
        assert_eq!(data["predict"]["label"], json!("NOT_CANCELED"));
        assert_eq!(
            data["predict"]["message"],
            json!("Likely to be NOT CANCELED (90.00% probability)")
        );
    }

    #[tokio::test]
    async fn schema_errors_are_reported() {
        let schema = TestSchema::new(predictor_with_score(0.82));

        let res = schema.execute(&predict_query(501, "City Hotel")).await;
        assert_eq!(
            res.errors[0].message,
            "field `lead_time` is out of range: 501 is not within [0, 500]"
        );

        let res = schema.execute(&predict_query(50, "Hostel")).await;
        assert_eq!(
            res.errors[0].message,
            "field `hotel` has unknown value `Hostel`"
        );
    }

    #[tokio::test]
    async fn inference_errors_are_generic() {
        let predictor = Predictor::new(
            Arc::new(CountingEncoder::default()),
            Arc::new(FixedOutputs(vec![1.3])),
        );
        let schema = TestSchema::new(predictor);
        let res = schema.execute(&predict_query(50, "City Hotel")).await;
        assert_eq!(res.errors.len(), 1);
        assert_eq!(res.errors[0].message, "prediction unavailable");
    }

    #[tokio::test]
    async fn booking_fields() {
        let schema = TestSchema::new(predictor_with_score(0.5));
        let res = schema
            .execute("{ bookingFields { name side kind min max default options } }")
            .await;
        let data = res.data.into_json().unwrap();
        let fields = data["bookingFields"].as_array().unwrap();
        assert_eq!(fields.len(), 22);

        assert_eq!(
            fields[0],
            json!({
                "name": "hotel",
                "side": "LEFT",
                "kind": "CHOICE",
                "min": null,
                "max": null,
                "default": "City Hotel",
                "options": ["City Hotel", "Resort Hotel"]
            })
        );
        assert_eq!(fields[1]["default"], json!("50"));
        assert_eq!(fields[1]["max"], json!(500.0));
        assert_eq!(fields[2]["kind"], json!("MONTH"));
        assert_eq!(fields[2]["options"][5], json!("June"));
        assert_eq!(fields[10]["side"], json!("RIGHT"));
        assert_eq!(fields[15]["default"], json!("100.0"));
    }
}
