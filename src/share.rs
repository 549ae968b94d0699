//! Share links
//!
//! A bundle is shared without any server-side storage: its four fields are
//! joined with `|`, the UTF-8 text is base64 encoded and the token is placed
//! in the path of `origin/share/<token>`. Opening such a link decodes the
//! token back into the bundle.
//!
//! Fields are not escaped. A bundle whose fields contain `|` encodes fine but
//! no longer decodes into four fields, so [`decode`] rejects it.

use crate::model::OutputBundle;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use url::Url;

/// Separator between bundle fields inside a token
pub(crate) const DELIMITER: char = '|';

/// Path segment preceding the token
const SHARE_SEGMENT: &str = "share";

/// Tokens we emit: URL-safe alphabet, no padding
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Tokens produced by browsers with `btoa` use the standard alphabet
const LEGACY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Errors decoding a share token
#[derive(Debug, thiserror::Error)]
pub(crate) enum DecodeError {
    #[error("Share token is not valid base64: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error("Share token is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Share token has {found} fields (expected 4)")]
    FieldCount { found: usize },
}

/// Errors building a share link
#[derive(Debug, thiserror::Error)]
pub(crate) enum ShareLinkError {
    #[error("Share origin cannot hold a path: {0}")]
    InvalidOrigin(String),
}

/// Encode a bundle into an opaque URL-safe token
pub(crate) fn encode(bundle: &OutputBundle) -> String {
    let joined = [
        bundle.script.as_str(),
        bundle.caption.as_str(),
        bundle.hashtags.as_str(),
        bundle.thumbnail_text.as_str(),
    ]
    .join(&DELIMITER.to_string());
    TOKEN_ENGINE.encode(joined.as_bytes())
}

/// Decode a token produced by [`encode`] (or by the browser client)
pub(crate) fn decode(token: &str) -> Result<OutputBundle, DecodeError> {
    let token = token.trim();
    let bytes = match TOKEN_ENGINE.decode(token) {
        Ok(bytes) => bytes,
        Err(url_safe_err) => LEGACY_ENGINE
            .decode(token)
            .map_err(|_| DecodeError::InvalidEncoding(url_safe_err))?,
    };
    let text = String::from_utf8(bytes)?;

    let fields: Vec<&str> = text.split(DELIMITER).collect();
    match fields.as_slice() {
        [script, caption, hashtags, thumbnail_text] => Ok(OutputBundle::new(
            *script,
            *caption,
            *hashtags,
            *thumbnail_text,
        )),
        _ => Err(DecodeError::FieldCount {
            found: fields.len(),
        }),
    }
}

/// Build `origin/share/<token>` for a bundle
pub(crate) fn share_url(origin: &Url, bundle: &OutputBundle) -> Result<Url, ShareLinkError> {
    let token = encode(bundle);
    let mut url = origin.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| ShareLinkError::InvalidOrigin(origin.to_string()))?
        .pop_if_empty()
        .push(SHARE_SEGMENT)
        .push(&token);
    Ok(url)
}

/// Extract the token from a share URL or bare `/share/<token>` path
///
/// Returns `None` when the input does not have the share shape.
pub(crate) fn token_from_url(input: &str) -> Option<String> {
    let input = input.trim();
    let path = match Url::parse(input) {
        Ok(url) => url.path().to_string(),
        Err(_) => input.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    let marker = format!("/{}/", SHARE_SEGMENT);
    let (_, token) = path.split_once(&marker)?;
    let token = token.trim_end_matches('/');
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
