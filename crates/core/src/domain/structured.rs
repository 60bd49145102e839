// Structured invoice data template
//
// Every stored invoice exposes the same set of extracted fields; parser output is
// merged over this template so missing fields read as empty values.

use serde_json::{Map, Value};

/// Field names extracted from invoices, with empty-string defaults
const STRING_FIELDS: &[&str] = &[
    "odenecek_tutar",
    "satici_unvani",
    "alici_unvan",
    "fatura_numarasi",
    "alici_vkn",
    "alici_unvan_raw_text",
    "siparis_no",
    "ettn",
    "satici_vergi_dairesi",
    "vergi_no",
    "tc_no",
    "alici_ad_soyad",
    "alici_tckn",
    "alici_adres",
    "telefon",
    "email",
    "iban",
    "fatura_tipi",
    "mal_hizmet_toplam_tutari",
    "ara_toplam",
    "toplam_kdv",
    "genel_toplam",
];

const DATE_FIELD: &str = "fatura_tarihi";
const LINE_ITEMS_FIELD: &str = "urun_kalemleri";

pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// The blank template
pub fn template() -> Value {
    let mut map = Map::new();
    for field in STRING_FIELDS {
        map.insert((*field).to_string(), Value::String(String::new()));
    }
    map.insert(DATE_FIELD.to_string(), Value::Null);
    map.insert(LINE_ITEMS_FIELD.to_string(), Value::Array(Vec::new()));
    Value::Object(map)
}

/// Locate the extracted fields in a raw parser response
///
/// Parsers nest them under `structured` or `yapilandirilmis_veri`; a response
/// without either key is taken as the field object itself.
pub fn extract_fields(response: &Value) -> Value {
    ["structured", "yapilandirilmis_veri"]
        .iter()
        .find_map(|key| response.get(*key).filter(|v| v.is_object()))
        .cloned()
        .unwrap_or_else(|| match response {
            Value::Object(_) => response.clone(),
            _ => empty_object(),
        })
}

/// Merge parsed fields over the template (parsed values win, unknown keys are kept)
pub fn merge_over_template(parsed: &Value) -> Value {
    let mut merged = template();
    if let (Value::Object(target), Value::Object(source)) = (&mut merged, parsed) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_template_has_all_fields() {
        let t = template();
        let obj = t.as_object().unwrap();
        assert_eq!(obj.len(), STRING_FIELDS.len() + 2);
        assert_eq!(obj["fatura_tarihi"], Value::Null);
        assert_eq!(obj["urun_kalemleri"], json!([]));
    }

    #[test]
    fn test_merge_prefers_parsed_values() {
        let merged = merge_over_template(&json!({
            "ettn": "ABC-123",
            "genel_toplam": "118.00",
            "extra_field": 7
        }));
        assert_eq!(merged["ettn"], "ABC-123");
        assert_eq!(merged["genel_toplam"], "118.00");
        assert_eq!(merged["extra_field"], 7);
        assert_eq!(merged["iban"], "");
    }

    #[test]
    fn test_extract_nested_fields() {
        let nested = json!({"structured": {"ettn": "X"}, "ocrText": "..."});
        assert_eq!(extract_fields(&nested), json!({"ettn": "X"}));

        let turkish = json!({"yapilandirilmis_veri": {"iban": "TR00"}});
        assert_eq!(extract_fields(&turkish), json!({"iban": "TR00"}));

        let flat = json!({"ettn": "Y"});
        assert_eq!(extract_fields(&flat), flat);

        assert_eq!(extract_fields(&json!(null)), empty_object());
    }

    #[test]
    fn test_merge_ignores_non_object_input() {
        assert_eq!(merge_over_template(&json!("garbage")), template());
    }
}
