use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Number, Value};

use crate::error::SchemaError;

/// An untyped booking as submitted by a client: column name to JSON value.
pub type RawRecord = Map<String, Value>;

macro_rules! choice_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Accepted values, in the order the form offers them.
            pub const NAMES: &'static [&'static str] = &[$($text),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(()),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

choice_enum!(Hotel {
    City => "City Hotel",
    Resort => "Resort Hotel",
});

choice_enum!(Meal {
    BedAndBreakfast => "BB",
    FullBoard => "FB",
    HalfBoard => "HB",
    SelfCatering => "SC",
});

choice_enum!(MarketSegment {
    OnlineTa => "Online TA",
    OfflineTaTo => "Offline TA/TO",
    Direct => "Direct",
    Corporate => "Corporate",
    Complementary => "Complementary",
});

choice_enum!(DistributionChannel {
    TaTo => "TA/TO",
    Direct => "Direct",
    Corporate => "Corporate",
    Gds => "GDS",
});

choice_enum!(RoomType {
    A => "A",
    B => "B",
    C => "C",
    D => "D",
    E => "E",
    F => "F",
    G => "G",
    H => "H",
});

choice_enum!(DepositType {
    NoDeposit => "No Deposit",
    NonRefund => "Non Refund",
    Refundable => "Refundable",
});

choice_enum!(CustomerType {
    Transient => "Transient",
    Contract => "Contract",
    Group => "Group",
    TransientParty => "Transient-Party",
});

pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Integer { min: i64, max: i64, default: i64 },
    /// A 0/1 integer offered as a two-way choice.
    Flag,
    /// An integer month number, shown by name.
    Month,
    Decimal { min: f64, max: f64, default: f64 },
    Choice { options: &'static [&'static str] },
}

impl FieldKind {
    /// The inclusive range of integer-valued kinds.
    pub fn integer_range(self) -> Option<(i64, i64)> {
        match self {
            Self::Integer { min, max, .. } => Some((min, max)),
            Self::Flag => Some((0, 1)),
            Self::Month => Some((1, 12)),
            Self::Decimal { .. } | Self::Choice { .. } => None,
        }
    }

    pub fn default_value(self) -> Value {
        match self {
            Self::Integer { default, .. } => Value::from(default),
            Self::Flag => Value::from(0),
            Self::Month => Value::from(1),
            Self::Decimal { default, .. } => Value::from(default),
            Self::Choice { options } => options
                .first()
                .map_or(Value::Null, |first| Value::from(*first)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormColumn {
    Left,
    Right,
}

#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub column: FormColumn,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn is_categorical(&self) -> bool {
        matches!(self.kind, FieldKind::Choice { .. })
    }
}

const fn integer(
    name: &'static str,
    label: &'static str,
    column: FormColumn,
    (min, max, default): (i64, i64, i64),
) -> FieldSpec {
    FieldSpec {
        name,
        label,
        column,
        kind: FieldKind::Integer { min, max, default },
    }
}

const fn choice(
    name: &'static str,
    label: &'static str,
    column: FormColumn,
    options: &'static [&'static str],
) -> FieldSpec {
    FieldSpec {
        name,
        label,
        column,
        kind: FieldKind::Choice { options },
    }
}

/// Every booking column in the order the encoder was fitted on.
pub static FIELDS: [FieldSpec; 22] = [
    choice("hotel", "Hotel Type", FormColumn::Left, Hotel::NAMES),
    integer(
        "lead_time",
        "Lead Time (days before arrival)",
        FormColumn::Left,
        (0, 500, 50),
    ),
    FieldSpec {
        name: "arrival_date_month",
        label: "Arrival Month",
        column: FormColumn::Left,
        kind: FieldKind::Month,
    },
    integer(
        "arrival_date_week_number",
        "Arrival Week Number",
        FormColumn::Left,
        (1, 52, 20),
    ),
    integer(
        "arrival_date_day_of_month",
        "Arrival Day of Month",
        FormColumn::Left,
        (1, 31, 15),
    ),
    integer(
        "stays_in_weekend_nights",
        "Weekend Nights",
        FormColumn::Left,
        (0, 10, 1),
    ),
    integer(
        "stays_in_week_nights",
        "Week Nights",
        FormColumn::Left,
        (0, 20, 2),
    ),
    integer("adults", "Number of Adults", FormColumn::Left, (1, 10, 2)),
    integer("children", "Number of Children", FormColumn::Left, (0, 10, 0)),
    integer("babies", "Number of Babies", FormColumn::Left, (0, 5, 0)),
    FieldSpec {
        name: "is_repeated_guest",
        label: "Repeated Guest?",
        column: FormColumn::Right,
        kind: FieldKind::Flag,
    },
    integer(
        "previous_cancellations",
        "Previous Cancellations",
        FormColumn::Right,
        (0, 10, 0),
    ),
    integer(
        "previous_bookings_not_canceled",
        "Previous Non-Canceled Bookings",
        FormColumn::Right,
        (0, 10, 0),
    ),
    integer(
        "required_car_parking_spaces",
        "Car Parking Spaces",
        FormColumn::Right,
        (0, 5, 0),
    ),
    integer(
        "total_of_special_requests",
        "Special Requests",
        FormColumn::Right,
        (0, 5, 0),
    ),
    FieldSpec {
        name: "adr",
        label: "Average Daily Rate (€)",
        column: FormColumn::Right,
        kind: FieldKind::Decimal {
            min: 0.0,
            max: 1000.0,
            default: 100.0,
        },
    },
    choice("meal", "Meal Type", FormColumn::Right, Meal::NAMES),
    choice(
        "market_segment",
        "Market Segment",
        FormColumn::Right,
        MarketSegment::NAMES,
    ),
    choice(
        "distribution_channel",
        "Distribution Channel",
        FormColumn::Right,
        DistributionChannel::NAMES,
    ),
    choice(
        "reserved_room_type",
        "Reserved Room Type",
        FormColumn::Right,
        RoomType::NAMES,
    ),
    choice(
        "deposit_type",
        "Deposit Type",
        FormColumn::Right,
        DepositType::NAMES,
    ),
    choice(
        "customer_type",
        "Customer Type",
        FormColumn::Right,
        CustomerType::NAMES,
    ),
];

pub fn field(name: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|spec| spec.name == name)
}

/// The record the form starts with.
pub fn default_raw() -> RawRecord {
    FIELDS
        .iter()
        .map(|spec| (spec.name.to_string(), spec.kind.default_value()))
        .collect()
}

/// Converts urlencoded form fields into a raw record.
///
/// Text that does not parse as the field's number type is kept as a string,
/// and blank numbers become null, so that validation reports them.
pub fn raw_from_form<'a, I>(pairs: I) -> RawRecord
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(name, text)| {
            let kind = field(name).map(|spec| spec.kind);
            let value = match kind {
                Some(FieldKind::Choice { .. }) | None => Value::from(text),
                Some(_) if text.trim().is_empty() => Value::Null,
                Some(FieldKind::Decimal { .. }) => text
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map_or_else(|| Value::from(text), Value::Number),
                Some(_) => text
                    .trim()
                    .parse::<i64>()
                    .map_or_else(|_| Value::from(text), Value::from),
            };
            (name.to_string(), value)
        })
        .collect()
}

/// The value of one column, as the encoder sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(&'static str),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One booking, validated against the domain of every column.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRecord {
    pub hotel: Hotel,
    pub lead_time: u32,
    pub arrival_date_month: u32,
    pub arrival_date_week_number: u32,
    pub arrival_date_day_of_month: u32,
    pub stays_in_weekend_nights: u32,
    pub stays_in_week_nights: u32,
    pub adults: u32,
    pub children: u32,
    pub babies: u32,
    pub is_repeated_guest: bool,
    pub previous_cancellations: u32,
    pub previous_bookings_not_canceled: u32,
    pub required_car_parking_spaces: u32,
    pub total_of_special_requests: u32,
    pub adr: f64,
    pub meal: Meal,
    pub market_segment: MarketSegment,
    pub distribution_channel: DistributionChannel,
    pub reserved_room_type: RoomType,
    pub deposit_type: DepositType,
    pub customer_type: CustomerType,
}

impl BookingRecord {
    /// Validates a raw record. Fields are checked in column order and the
    /// first violation is reported.
    pub fn from_raw(raw: &RawRecord) -> Result<Self, SchemaError> {
        if let Some(unknown) = raw.keys().find(|name| field(name).is_none()) {
            return Err(SchemaError::UnknownField(unknown.clone()));
        }
        let fields = Fields(raw);
        Ok(Self {
            hotel: fields.choice("hotel")?,
            lead_time: fields.integer("lead_time")?,
            arrival_date_month: fields.integer("arrival_date_month")?,
            arrival_date_week_number: fields.integer("arrival_date_week_number")?,
            arrival_date_day_of_month: fields.integer("arrival_date_day_of_month")?,
            stays_in_weekend_nights: fields.integer("stays_in_weekend_nights")?,
            stays_in_week_nights: fields.integer("stays_in_week_nights")?,
            adults: fields.integer("adults")?,
            children: fields.integer("children")?,
            babies: fields.integer("babies")?,
            is_repeated_guest: fields.integer("is_repeated_guest")? == 1,
            previous_cancellations: fields.integer("previous_cancellations")?,
            previous_bookings_not_canceled: fields.integer("previous_bookings_not_canceled")?,
            required_car_parking_spaces: fields.integer("required_car_parking_spaces")?,
            total_of_special_requests: fields.integer("total_of_special_requests")?,
            adr: fields.decimal("adr")?,
            meal: fields.choice("meal")?,
            market_segment: fields.choice("market_segment")?,
            distribution_channel: fields.choice("distribution_channel")?,
            reserved_room_type: fields.choice("reserved_room_type")?,
            deposit_type: fields.choice("deposit_type")?,
            customer_type: fields.choice("customer_type")?,
        })
    }

    pub fn cell(&self, column: &str) -> Option<Cell> {
        let cell = match column {
            "hotel" => Cell::Text(self.hotel.as_str()),
            "lead_time" => Cell::Number(self.lead_time.into()),
            "arrival_date_month" => Cell::Number(self.arrival_date_month.into()),
            "arrival_date_week_number" => Cell::Number(self.arrival_date_week_number.into()),
            "arrival_date_day_of_month" => Cell::Number(self.arrival_date_day_of_month.into()),
            "stays_in_weekend_nights" => Cell::Number(self.stays_in_weekend_nights.into()),
            "stays_in_week_nights" => Cell::Number(self.stays_in_week_nights.into()),
            "adults" => Cell::Number(self.adults.into()),
            "children" => Cell::Number(self.children.into()),
            "babies" => Cell::Number(self.babies.into()),
            "is_repeated_guest" => Cell::Number(u8::from(self.is_repeated_guest).into()),
            "previous_cancellations" => Cell::Number(self.previous_cancellations.into()),
            "previous_bookings_not_canceled" => {
                Cell::Number(self.previous_bookings_not_canceled.into())
            }
            "required_car_parking_spaces" => Cell::Number(self.required_car_parking_spaces.into()),
            "total_of_special_requests" => Cell::Number(self.total_of_special_requests.into()),
            "adr" => Cell::Number(self.adr),
            "meal" => Cell::Text(self.meal.as_str()),
            "market_segment" => Cell::Text(self.market_segment.as_str()),
            "distribution_channel" => Cell::Text(self.distribution_channel.as_str()),
            "reserved_room_type" => Cell::Text(self.reserved_room_type.as_str()),
            "deposit_type" => Cell::Text(self.deposit_type.as_str()),
            "customer_type" => Cell::Text(self.customer_type.as_str()),
            _ => return None,
        };
        Some(cell)
    }
}

struct Fields<'a>(&'a RawRecord);

impl Fields<'_> {
    fn lookup(&self, name: &str) -> Result<(&'static FieldSpec, &Value), SchemaError> {
        let spec = field(name).ok_or_else(|| SchemaError::UnknownField(name.to_string()))?;
        match self.0.get(spec.name) {
            None | Some(Value::Null) => Err(SchemaError::MissingField(spec.name)),
            Some(value) => Ok((spec, value)),
        }
    }

    fn integer(&self, name: &str) -> Result<u32, SchemaError> {
        let (spec, value) = self.lookup(name)?;
        let wrong_type = SchemaError::WrongType {
            field: spec.name,
            expected: "an integer",
        };
        let Some((min, max)) = spec.kind.integer_range() else {
            return Err(wrong_type);
        };
        let n = value.as_i64().ok_or(wrong_type)?;
        u32::try_from(n)
            .ok()
            .filter(|_| (min..=max).contains(&n))
            .ok_or_else(|| SchemaError::OutOfRange {
                field: spec.name,
                value: n.to_string(),
                min: min.to_string(),
                max: max.to_string(),
            })
    }

    fn decimal(&self, name: &str) -> Result<f64, SchemaError> {
        let (spec, value) = self.lookup(name)?;
        let wrong_type = SchemaError::WrongType {
            field: spec.name,
            expected: "a number",
        };
        let FieldKind::Decimal { min, max, .. } = spec.kind else {
            return Err(wrong_type);
        };
        let x = value.as_f64().ok_or(wrong_type)?;
        if !x.is_finite() || x < min || x > max {
            return Err(SchemaError::OutOfRange {
                field: spec.name,
                value: x.to_string(),
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        Ok(x)
    }

    fn choice<T: FromStr>(&self, name: &str) -> Result<T, SchemaError> {
        let (spec, value) = self.lookup(name)?;
        let text = value.as_str().ok_or(SchemaError::WrongType {
            field: spec.name,
            expected: "a string",
        })?;
        text.parse().map_err(|_| SchemaError::UnknownChoice {
            field: spec.name,
            value: text.to_string(),
        })
    }
}
