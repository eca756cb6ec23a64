use std::collections::{HashSet, VecDeque};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient;
use crate::validation::ProfileForm;

static SHORT_CLIENT_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2}-\d{2}\([^)]+\))").expect("invalid client code pattern"));

const KNOWN_CITIES: &[&str] = &["Бишкек", "Ош"];
const CITY_KEYS: &[&str] = &[
    "city",
    "city_name",
    "cityName",
    "city_title",
    "cityTitle",
    "town",
    "settlement",
    "region_name",
    "region",
];
const ADDRESS_KEYS: &[&str] = &["full_address", "fullAddress", "location", "desc", "description"];
const CITY_MAX_CHARS: usize = 40;
const DEEP_SEARCH_STEPS: usize = 250;
pub const FALLBACK_CITY: &str = "Пункт выдачи";

/// The signed-in account as returned by `me/` and cached locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, deserialize_with = "lenient::id")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub full_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_employee: bool,
    #[serde(default, deserialize_with = "lenient::string")]
    pub client_code: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub client_code_display: String,
    #[serde(default)]
    pub pickup_point: Option<PickupPoint>,
    #[serde(default, deserialize_with = "lenient::id")]
    pub pickup_point_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub cn_warehouse_address: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// `client_code_display`, falling back to the raw code.
    pub fn display_code(&self) -> &str {
        if self.client_code_display.is_empty() {
            &self.client_code
        } else {
            &self.client_code_display
        }
    }

    /// The `NN-NN(...)` fragment of the display code, or empty.
    pub fn short_code(&self) -> String {
        SHORT_CLIENT_CODE
            .captures(self.display_code())
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }

    pub fn selected_pickup_point(&self) -> Option<i64> {
        self.pickup_point
            .as_ref()
            .and_then(|point| point.id)
            .or(self.pickup_point_id)
    }

    pub fn profile_form(&self) -> ProfileForm {
        ProfileForm {
            full_name: self.full_name.clone(),
            email: self.email.clone().filter(|email| !email.is_empty()),
            pickup_point_id: self.selected_pickup_point(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarehouseRef {
    #[serde(default, deserialize_with = "lenient::id")]
    pub id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PickupPoint {
    #[serde(default, deserialize_with = "lenient::id")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub code_label: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub region_code: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub branch_code: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub address: String,
    #[serde(default)]
    pub default_cn_warehouse: Option<WarehouseRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PickupPoint {
    /// `LIDER CARGO <LABEL> <region>-<branch>` followed by the address line.
    pub fn label_text(&self) -> String {
        let heading = format!(
            "LIDER CARGO {} {}-{}",
            self.code_label.to_uppercase(),
            self.region_code,
            self.branch_code
        );
        [heading.trim(), self.address.trim()]
            .into_iter()
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Best address line: an explicit address field, otherwise street,
    /// house and landmark put together.
    pub fn address_line(&self) -> String {
        if let Some(direct) = first_text([Some(self.address.as_str())]
            .into_iter()
            .chain(ADDRESS_KEYS.iter().map(|key| self.extra_text(key))))
        {
            return direct;
        }

        let street = first_text(["street", "street_name", "streetName"].map(|k| self.extra_text(k)));
        let house = first_text(["house", "house_number", "houseNumber"].map(|k| self.extra_text(k)));
        let note = first_text(["note", "landmark"].map(|k| self.extra_text(k)));

        let mut line = street.unwrap_or_default();
        if let Some(house) = house {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&house);
        }
        if let Some(note) = note {
            line.push_str(if line.is_empty() { "(" } else { " (" });
            line.push_str(&note);
            line.push(')');
        }
        line.trim().to_string()
    }

    /// City name from the dedicated fields, the address, or any nested
    /// string naming a known city.
    pub fn city(&self) -> Option<String> {
        let address = self.address_line();
        let named = CITY_KEYS
            .iter()
            .filter_map(|key| self.extra.get(*key))
            .chain(
                self.extra
                    .iter()
                    .filter(|(key, _)| key.to_lowercase().contains("city"))
                    .map(|(_, value)| value),
            )
            .map(any_text)
            .chain(std::iter::once(city_from_address(&address)));

        named
            .map(|candidate| candidate.trim().to_string())
            .find(|candidate| !is_placeholder_city(candidate))
            .or_else(|| find_known_city(&Value::Object(self.extra.clone())))
    }

    /// Title and subtitle for a pickup point picker entry.
    pub fn option_text(&self) -> (String, String) {
        let city = self.city().unwrap_or_else(|| FALLBACK_CITY.to_string());
        let address = self.address_line();
        let subtitle = if address.is_empty() {
            String::new()
        } else if address.to_lowercase().contains(&city.to_lowercase()) {
            address
        } else {
            format!("{city} • {address}")
        };
        (city, subtitle)
    }

    pub fn cn_warehouse_id(&self) -> Option<i64> {
        self.default_cn_warehouse.as_ref().and_then(|w| w.id)
    }

    fn extra_text(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

fn first_text<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

/// Text of a string, or of a named object (`{"name": "Ош"}`).
fn any_text(value: &Value) -> String {
    const PREFERRED: &[&str] = &["name", "title", "label", "ru", "kg", "display", "text", "value"];
    match value {
        Value::String(text) => text.clone(),
        Value::Object(map) => PREFERRED
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .chain(map.values().filter_map(Value::as_str))
            .find(|text| !text.trim().is_empty())
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

fn city_from_address(address: &str) -> String {
    let plausible = |left: &str| {
        let left = left.trim();
        (!left.is_empty()
            && !left.chars().any(|c| c.is_ascii_digit())
            && left.chars().count() <= CITY_MAX_CHARS)
            .then(|| left.to_string())
    };

    let bullets: Vec<&str> = address
        .split('•')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    if bullets.len() >= 2 {
        if let Some(city) = plausible(bullets[0]) {
            return city;
        }
    }

    [" — ", " - ", " – "]
        .iter()
        .filter(|dash| address.contains(**dash))
        .find_map(|dash| address.split(*dash).next().and_then(plausible))
        .unwrap_or_default()
}

fn is_placeholder_city(candidate: &str) -> bool {
    let lowered = candidate.trim().to_lowercase();
    lowered.is_empty() || lowered == "пункт выдачи" || lowered == "пункт выдачи заказов"
}

/// Breadth-first search for a string equal to a known city name.
fn find_known_city(root: &Value) -> Option<String> {
    let matches = |text: &str| {
        let text = text.trim().to_lowercase();
        KNOWN_CITIES
            .iter()
            .find(|city| city.to_lowercase() == text)
            .map(|city| city.to_string())
    };

    let mut queue = VecDeque::from([root]);
    let mut seen = HashSet::new();
    let mut steps = 0;

    while let Some(current) = queue.pop_front() {
        steps += 1;
        if steps > DEEP_SEARCH_STEPS {
            break;
        }
        if !seen.insert(current as *const Value) {
            continue;
        }
        let children: Box<dyn Iterator<Item = &Value>> = match current {
            Value::String(text) => {
                if let Some(city) = matches(text) {
                    return Some(city);
                }
                continue;
            }
            Value::Object(map) => Box::new(map.values()),
            Value::Array(items) => Box::new(items.iter()),
            _ => continue,
        };
        for child in children {
            match child {
                Value::String(text) => {
                    if let Some(city) = matches(text) {
                        return Some(city);
                    }
                }
                Value::Object(_) | Value::Array(_) => queue.push_back(child),
                _ => {}
            }
        }
    }
    None
}

/// China-side receiving warehouse shown on the home page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Warehouse {
    #[serde(default, deserialize_with = "lenient::id")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub address_cn: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub contact_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub contact_phone: String,
}

/// Everything the home page shows above the tracking box.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HomeSummary {
    pub client_code_display: String,
    pub client_code_short: String,
    pub pickup_text: String,
    pub warehouse: Option<Warehouse>,
}
