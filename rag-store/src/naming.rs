//! Deterministic index and point naming.

use uuid::Uuid;

const NAME_SLUG_MAX: usize = 24;
const ID_SLUG_MAX: usize = 32;

/// Lowercases, trims and collapses inner whitespace.
pub fn normalize_file_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Resolves the per-document index name.
///
/// Shape: `{prefix}_{file_id slug}_{name slug}_{16 hex of blake3}`. The hash
/// covers the full file id and the normalized file name, so slugs may be
/// truncated without making distinct documents collide.
pub fn index_name(prefix: &str, file_id: &str, file_name: &str) -> String {
    let normalized = normalize_file_name(file_name);

    let mut hasher = blake3::Hasher::new();
    hasher.update(file_id.as_bytes());
    hasher.update(&[0]);
    hasher.update(normalized.as_bytes());
    let hex = hasher.finalize().to_hex();

    let id_slug = slug(file_id, ID_SLUG_MAX);
    let name_slug = slug(&normalized, NAME_SLUG_MAX);

    let mut out = String::with_capacity(prefix.len() + id_slug.len() + name_slug.len() + 19);
    out.push_str(prefix);
    for part in [id_slug.as_str(), name_slug.as_str(), &hex.as_str()[..16]] {
        if !part.is_empty() {
            out.push('_');
            out.push_str(part);
        }
    }
    out
}

/// Stable point id for `(index_name, chunk_index)`.
pub fn point_id(index_name: &str, chunk_index: u64) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("{index_name}#{chunk_index}").as_bytes(),
    )
}

fn slug(s: &str, max: usize) -> String {
    let mut out = String::with_capacity(max);
    let mut last_dash = true;
    for c in s.chars() {
        if out.len() >= max {
            break;
        }
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_same_name() {
        let a = index_name("doc", "42", "Quarterly Report.pdf");
        let b = index_name("doc", "42", "  quarterly   report.PDF ");
        assert_eq!(a, b);
        assert!(a.starts_with("doc_42_quarterly-report-pdf_"));
    }

    #[test]
    fn long_similar_names_do_not_collide() {
        let base = "Project status report for the northern region";
        let a = index_name("doc", "7", &format!("{base} - draft 1.docx"));
        let b = index_name("doc", "7", &format!("{base} - draft 2.docx"));
        assert_ne!(a, b);

        let c = index_name("doc", "8", &format!("{base} - draft 1.docx"));
        assert_ne!(a, c);
    }

    #[test]
    fn names_are_store_safe() {
        let n = index_name("doc", "a/b c", "Отчёт №5.pdf");
        assert!(
            n.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        );
    }

    #[test]
    fn point_ids_are_stable_per_position() {
        assert_eq!(point_id("doc_1", 3), point_id("doc_1", 3));
        assert_ne!(point_id("doc_1", 3), point_id("doc_1", 4));
        assert_ne!(point_id("doc_1", 3), point_id("doc_2", 3));
    }
}
