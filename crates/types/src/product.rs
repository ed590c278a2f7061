//! Product record and update payload.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

const ID_KEY: &str = "id";
const TYPE_KEY: &str = "type";
const NAME_KEY: &str = "name";
const VERSION_KEY: &str = "version";
const COLOR_KEY: &str = "color";
const PRICE_KEY: &str = "price";

/// A financial product offering as returned by the provider.
///
/// Known fields are typed and optional. Every other key, and any known key
/// whose value does not have the expected JSON type, is kept verbatim in
/// [`Product::extra`] so newer provider fields never break decoding.
///
/// Equality is structural: two products are equal when every typed field and
/// every captured extra entry match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Product {
    /// Stable product identifier.
    pub id: Option<String>,
    /// Category code, carried on the wire as `type`.
    pub kind: Option<String>,
    /// Display name.
    pub name: Option<String>,
    pub version: Option<String>,
    pub color: Option<String>,
    /// Price as sent by the provider; kept as a JSON number so `65` and `65.0` round-trip unchanged.
    pub price: Option<Number>,
    /// Unrecognized keys, in the order they were decoded.
    pub extra: IndexMap<String, Value>,
}

impl Product {
    /// Build a product from the three fields every provider response carries.
    pub fn new(id: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            kind: Some(kind.into()),
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Convert a decoded JSON object into a product.
    ///
    /// Never fails: absent keys leave the matching field empty and mistyped
    /// known keys are moved into [`Product::extra`].
    pub fn from_wire(payload: Map<String, Value>) -> Self {
        let mut product = Self::default();
        for (key, value) in payload {
            let unclaimed = match key.as_str() {
                ID_KEY => claim_string(&mut product.id, value),
                TYPE_KEY => claim_string(&mut product.kind, value),
                NAME_KEY => claim_string(&mut product.name, value),
                VERSION_KEY => claim_string(&mut product.version, value),
                COLOR_KEY => claim_string(&mut product.color, value),
                PRICE_KEY => match value {
                    Value::Number(number) => {
                        product.price = Some(number);
                        None
                    }
                    other => Some(other),
                },
                _ => Some(value),
            };
            if let Some(value) = unclaimed {
                product.extra.insert(key, value);
            }
        }
        product
    }

    /// Encode the product back into its wire object.
    ///
    /// Typed fields win over an `extra` entry with the same key.
    pub fn to_wire(&self) -> Map<String, Value> {
        self.clone().into_wire()
    }

    fn into_wire(self) -> Map<String, Value> {
        let mut wire: Map<String, Value> = self.extra.into_iter().collect();
        let typed = [
            (ID_KEY, self.id.map(Value::String)),
            (TYPE_KEY, self.kind.map(Value::String)),
            (NAME_KEY, self.name.map(Value::String)),
            (VERSION_KEY, self.version.map(Value::String)),
            (COLOR_KEY, self.color.map(Value::String)),
            (PRICE_KEY, self.price.map(Value::Number)),
        ];
        for (key, value) in typed {
            if let Some(value) = value {
                wire.insert(key.to_string(), value);
            }
        }
        wire
    }

    /// Look up any field by its wire name, typed or captured.
    pub fn field(&self, key: &str) -> Option<Value> {
        let typed = match key {
            ID_KEY => self.id.clone().map(Value::String),
            TYPE_KEY => self.kind.clone().map(Value::String),
            NAME_KEY => self.name.clone().map(Value::String),
            VERSION_KEY => self.version.clone().map(Value::String),
            COLOR_KEY => self.color.clone().map(Value::String),
            PRICE_KEY => self.price.clone().map(Value::Number),
            _ => None,
        };
        typed.or_else(|| self.extra.get(key).cloned())
    }
}

fn claim_string(slot: &mut Option<String>, value: Value) -> Option<Value> {
    match value {
        Value::String(text) => {
            *slot = Some(text);
            None
        }
        other => Some(other),
    }
}

impl From<Map<String, Value>> for Product {
    fn from(payload: Map<String, Value>) -> Self {
        Self::from_wire(payload)
    }
}

impl From<Product> for Map<String, Value> {
    fn from(product: Product) -> Self {
        product.into_wire()
    }
}

/// Update payload sent with `POST /product/{id}`.
///
/// The client forwards it as-is; absent fields are omitted from the body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductUpdate {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

impl ProductUpdate {
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }
}
