//! String normalization tables for carrier payloads.
//!
//! SIM-type aliases and US state codes arrive as free text from the
//! conversational layer; the carrier API wants canonical values.

use crate::domain::context::SimType;

pub fn normalize_sim_type(raw: &str) -> Option<SimType> {
    let normalized = raw.trim().to_ascii_lowercase().replace(['-', '_', ' '], "");
    match normalized.as_str() {
        "esim" | "e" | "embedded" | "embeddedsim" | "digital" | "digitalsim" => Some(SimType::Esim),
        "physical" | "physicalsim" | "psim" | "simcard" | "nanosim" | "nano" | "card" => {
            Some(SimType::Physical)
        }
        _ => None,
    }
}

/// Map a state name or code to its two-letter USPS code.
pub fn normalize_state_code(raw: &str) -> Option<&'static str> {
    let normalized = raw.trim().to_ascii_lowercase().replace(['.', ','], "");
    let collapsed = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    let code = match collapsed.as_str() {
        "alabama" | "al" => "AL",
        "alaska" | "ak" => "AK",
        "arizona" | "az" => "AZ",
        "arkansas" | "ar" => "AR",
        "california" | "ca" => "CA",
        "colorado" | "co" => "CO",
        "connecticut" | "ct" => "CT",
        "delaware" | "de" => "DE",
        "district of columbia" | "dc" => "DC",
        "florida" | "fl" => "FL",
        "georgia" | "ga" => "GA",
        "hawaii" | "hi" => "HI",
        "idaho" | "id" => "ID",
        "illinois" | "il" => "IL",
        "indiana" | "in" => "IN",
        "iowa" | "ia" => "IA",
        "kansas" | "ks" => "KS",
        "kentucky" | "ky" => "KY",
        "louisiana" | "la" => "LA",
        "maine" | "me" => "ME",
        "maryland" | "md" => "MD",
        "massachusetts" | "ma" => "MA",
        "michigan" | "mi" => "MI",
        "minnesota" | "mn" => "MN",
        "mississippi" | "ms" => "MS",
        "missouri" | "mo" => "MO",
        "montana" | "mt" => "MT",
        "nebraska" | "ne" => "NE",
        "nevada" | "nv" => "NV",
        "new hampshire" | "nh" => "NH",
        "new jersey" | "nj" => "NJ",
        "new mexico" | "nm" => "NM",
        "new york" | "ny" => "NY",
        "north carolina" | "nc" => "NC",
        "north dakota" | "nd" => "ND",
        "ohio" | "oh" => "OH",
        "oklahoma" | "ok" => "OK",
        "oregon" | "or" => "OR",
        "pennsylvania" | "pa" => "PA",
        "rhode island" | "ri" => "RI",
        "south carolina" | "sc" => "SC",
        "south dakota" | "sd" => "SD",
        "tennessee" | "tn" => "TN",
        "texas" | "tx" => "TX",
        "utah" | "ut" => "UT",
        "vermont" | "vt" => "VT",
        "virginia" | "va" => "VA",
        "washington" | "wa" => "WA",
        "west virginia" | "wv" => "WV",
        "wisconsin" | "wi" => "WI",
        "wyoming" | "wy" => "WY",
        _ => return None,
    };
    Some(code)
}

/// Strip embedded data-quantity annotations such as "(50GB)" from a plan
/// display name. The carrier's purchase API wants the bare catalog name.
pub fn strip_data_annotation(name: &str) -> String {
    let mut output = String::with_capacity(name.len());
    let mut chars = name.char_indices().peekable();

    while let Some((index, character)) = chars.next() {
        if character == '(' {
            if let Some(close) = name[index..].find(')') {
                let inner = &name[index + 1..index + close];
                if is_data_quantity(inner) {
                    // Skip the annotation and the closing paren.
                    while let Some((inner_index, _)) = chars.peek().copied() {
                        chars.next();
                        if inner_index == index + close {
                            break;
                        }
                    }
                    continue;
                }
            }
        }
        output.push(character);
    }

    output.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_data_quantity(inner: &str) -> bool {
    let trimmed = inner.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let unit = ["gb", "mb", "tb"].iter().find(|unit| lowered.ends_with(*unit));
    let Some(unit) = unit else {
        return false;
    };
    let quantity = lowered[..lowered.len() - unit.len()].trim();
    !quantity.is_empty() && quantity.chars().all(|c| c.is_ascii_digit() || c == '.')
}
