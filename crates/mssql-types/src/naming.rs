//! Column name normalization used when scanning rows into structs.

/// Title-case the words of a column name and join them.
///
/// Words are separated by `_`, `-`, `:`, spaces, or start at an upper case
/// letter.
///
/// ```
/// use mssql_types::naming::camelize;
///
/// assert_eq!(camelize("dino_party"), "DinoParty");
/// assert_eq!(camelize("iso_medo-uDucan"), "IsoMedoUDucan");
/// ```
#[must_use]
pub fn camelize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut word_len = 0usize;
    for c in name.chars() {
        let spacer = matches!(c, '_' | ' ' | ':' | '-');
        if word_len > 0 && (spacer || c.is_uppercase()) {
            word_len = 0;
        }
        if spacer {
            continue;
        }
        if word_len == 0 {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        word_len += 1;
    }
    out
}

/// The key a column or struct field is matched by.
///
/// `au_id`, `AuId` and `AuID` all map to `auid`.
#[must_use]
pub fn field_key(name: &str) -> String {
    camelize(name).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camelize() {
        assert_eq!(camelize("dino_party"), "DinoParty");
        assert_eq!(camelize("ponuda_id"), "PonudaId");
        assert_eq!(camelize("iso_medo_u_ducan"), "IsoMedoUDucan");
        assert_eq!(camelize("iso-medo-u-ducan"), "IsoMedoUDucan");
        assert_eq!(camelize("isoMedoUDucan"), "IsoMedoUDucan");
        assert_eq!(camelize("iso_medo-uDucan"), "IsoMedoUDucan");
    }

    #[test]
    fn test_camelize_edge_cases() {
        assert_eq!(camelize(""), "");
        assert_eq!(camelize("__id__"), "Id");
        assert_eq!(camelize("a:b c"), "ABC");
    }

    #[test]
    fn test_field_key() {
        assert_eq!(field_key("au_id"), "auid");
        assert_eq!(field_key("AuId"), "auid");
        assert_eq!(field_key("AuID"), "auid");
        assert_eq!(field_key("au_fname"), field_key("AuFname"));
    }
}
