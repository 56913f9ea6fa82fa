//! Field-name canonicalization

/// Field name platforms use as a type-union discriminator
pub const DISCRIMINATOR_KEY: &str = "_";

/// Name the discriminator is stored under
pub const TYPE_KEY: &str = "type";

/// Rewrites a field name into canonical camel case
///
/// The name is split on runs of underscores. The first piece is kept as is and
/// every following piece is title-cased, so `reply_to_msg_id` becomes
/// `replyToMsgId` and an already camel-cased `userId` is left alone. The
/// discriminator `_` becomes `type`.
///
/// # Examples
///
/// ```
/// use social_harvest::normalize::canonical_key;
///
/// assert_eq!(canonical_key("from_id"), "fromId");
/// assert_eq!(canonical_key("_"), "type");
/// ```
pub fn canonical_key(key: &str) -> String {
    if key == DISCRIMINATOR_KEY {
        return TYPE_KEY.to_string();
    }

    let mut pieces = key.split('_');
    let mut out = String::with_capacity(key.len());
    if let Some(first) = pieces.next() {
        out.push_str(first);
    }
    for piece in pieces {
        title_case_into(piece, &mut out);
    }
    out
}

/// Appends `piece` title-cased: each alphabetic run starts upper-case and
/// continues lower-case
fn title_case_into(piece: &str, out: &mut String) {
    let mut previous_alpha = false;
    for c in piece.chars() {
        if c.is_alphabetic() {
            if previous_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_alpha = true;
        } else {
            out.push(c);
            previous_alpha = false;
        }
    }
}
