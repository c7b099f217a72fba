use crate::error::{LlbError, LlbResult};

const DEFAULT_DOMAIN: &str = "docker.io";
const LEGACY_DOMAIN: &str = "index.docker.io";
const OFFICIAL_NAMESPACE: &str = "library";
const DEFAULT_TAG: &str = "latest";

/// Normalize an image reference the way container registries resolve it.
///
/// Short names gain the default registry and the `library/` namespace, a
/// missing tag becomes `latest`:
///
/// ```
/// use bunny_llb::normalize_image_reference;
///
/// assert_eq!(
///     normalize_image_reference("alpine").unwrap(),
///     "docker.io/library/alpine:latest"
/// );
/// assert_eq!(
///     normalize_image_reference("harbor.nbfc.io/nubificus/app").unwrap(),
///     "harbor.nbfc.io/nubificus/app:latest"
/// );
/// ```
///
/// # Errors
///
/// Returns `LlbError::InvalidReference` when the reference does not follow
/// the distribution reference grammar.
pub fn normalize_image_reference(reference: &str) -> LlbResult<String> {
    let invalid =
        |reason: &str| LlbError::InvalidReference(reference.to_string(), reason.to_string());

    if reference.is_empty() {
        return Err(invalid("reference is empty"));
    }
    if reference.chars().any(char::is_whitespace) {
        return Err(invalid("reference contains whitespace"));
    }

    let (named, digest) = match reference.split_once('@') {
        Some((named, digest)) => (named, Some(digest)),
        None => (reference, None),
    };

    if let Some(digest) = digest {
        let valid = digest
            .split_once(':')
            .is_some_and(|(algorithm, hex)| {
                !algorithm.is_empty()
                    && hex.len() >= 32
                    && hex.chars().all(|c| c.is_ascii_hexdigit())
            });
        if !valid {
            return Err(invalid("malformed digest"));
        }
    }

    let last_slash = named.rfind('/');
    let (name, tag) = match named.rfind(':') {
        Some(colon) if last_slash.is_none_or(|slash| colon > slash) => {
            (&named[..colon], Some(&named[colon + 1..]))
        }
        _ => (named, None),
    };

    if let Some(tag) = tag {
        if !valid_tag(tag) {
            return Err(invalid("malformed tag"));
        }
    }

    let (domain, path) = split_domain(name);
    for component in path.split('/') {
        if !valid_path_component(component) {
            return Err(invalid(
                "repository name must be lowercase alphanumerics separated by '.', '_' or '-'",
            ));
        }
    }

    let mut normalized = format!("{domain}/{path}");
    match (tag, digest) {
        (Some(tag), _) => {
            normalized.push(':');
            normalized.push_str(tag);
        }
        (None, None) => {
            normalized.push(':');
            normalized.push_str(DEFAULT_TAG);
        }
        (None, Some(_)) => {}
    }
    if let Some(digest) = digest {
        normalized.push('@');
        normalized.push_str(digest);
    }

    Ok(normalized)
}

fn split_domain(name: &str) -> (&str, String) {
    match name.split_once('/') {
        Some((first, rest)) if first.contains(['.', ':']) || first == "localhost" => {
            let domain = if first == LEGACY_DOMAIN { DEFAULT_DOMAIN } else { first };
            (domain, rest.to_string())
        }
        Some(_) => (DEFAULT_DOMAIN, name.to_string()),
        None => (DEFAULT_DOMAIN, format!("{OFFICIAL_NAMESPACE}/{name}")),
    }
}

fn valid_path_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-'))
}

fn valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    tag.len() <= 128
        && (first.is_ascii_alphanumeric() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
