//! UK dialing codes for places whose catalog row has none.

/// Fallback for places with no better match
pub const DEFAULT_AREA_CODE: &str = "01";

/// Partial matches resolve to the first entry in table order
const AREA_CODES: &[(&str, &str)] = &[
    // Major cities
    ("London", "020"),
    ("Birmingham", "0121"),
    ("Manchester", "0161"),
    ("Leeds", "0113"),
    ("Glasgow", "0141"),
    ("Liverpool", "0151"),
    ("Newcastle", "0191"),
    ("Sheffield", "0114"),
    ("Bristol", "0117"),
    ("Belfast", "028"),
    ("Edinburgh", "0131"),
    ("Cardiff", "029"),
    // Other notable cities
    ("Southampton", "023"),
    ("Portsmouth", "023"),
    ("Nottingham", "0115"),
    ("Leicester", "0116"),
    ("Coventry", "024"),
    ("Aberdeen", "01224"),
    ("Dundee", "01382"),
    ("Swansea", "01792"),
    ("Plymouth", "01752"),
    ("Brighton", "01273"),
    ("Cambridge", "01223"),
    ("Oxford", "01865"),
    ("York", "01904"),
    // Regions
    ("Inner London", "020"),
    ("Outer London", "020"),
    ("Greater Manchester", "0161"),
    ("West Midlands", "0121"),
    ("Yorkshire", "0113"),
    ("North East", "0191"),
];

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Dialing code for a place name.
///
/// Tries an exact match ignoring case and whitespace, then the first table
/// entry whose name appears inside `name`, then [`DEFAULT_AREA_CODE`].
pub fn area_code_for(name: &str) -> &'static str {
    let wanted = normalize(name);

    if let Some((_, code)) = AREA_CODES.iter().find(|(city, _)| normalize(city) == wanted) {
        return *code;
    }

    AREA_CODES
        .iter()
        .find(|(city, _)| wanted.contains(&normalize(city)))
        .map(|(_, code)| *code)
        .unwrap_or(DEFAULT_AREA_CODE)
}
