//! Messaging identifiers (`user[:device]@server`) and phone number helpers.

/// Server of phone-number based identifiers.
pub const USER_SERVER: &str = "s.whatsapp.net";
/// Server of opaque linked-device identifiers.
pub const LID_SERVER: &str = "lid";

/// Split an identifier into its user part (device suffix removed) and server.
#[must_use]
pub fn split_jid(id: &str) -> (&str, Option<&str>) {
    let (user, server) = match id.split_once('@') {
        Some((u, s)) => (u, Some(s)),
        None => (id, None),
    };
    let user = user.split_once(':').map_or(user, |(u, _)| u);
    (user.trim(), server.map(str::trim))
}

/// An identifier is canonical when its user part is already a phone-number id.
#[must_use]
pub fn is_canonical(id: &str) -> bool {
    matches!(split_jid(id).1, None | Some(USER_SERVER))
}

/// Strip separators and rewrite a leading local `0` to the `62` country code.
#[must_use]
pub fn sanitize_phone(phone: &str) -> String {
    let cleaned: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '+'))
        .collect();
    match cleaned.strip_prefix('0') {
        Some(rest) => format!("62{rest}"),
        None => cleaned,
    }
}

/// Normalize free-form input to digits in international form.
///
/// `0812…` and `812…` both become `62812…`.
#[must_use]
pub fn format_phone_number(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if let Some(rest) = digits.strip_prefix('0') {
        format!("62{rest}")
    } else if digits.starts_with('8') {
        format!("62{digits}")
    } else {
        digits
    }
}

#[must_use]
pub fn format_phone_for_display(phone: &str) -> String {
    match phone.strip_prefix("62") {
        Some(rest) => format!("0{rest}"),
        None => phone.to_string(),
    }
}

/// 10 to 15 ASCII digits.
#[must_use]
pub fn looks_like_phone(user: &str) -> bool {
    (10..=15).contains(&user.len()) && user.bytes().all(|b| b.is_ascii_digit())
}

/// Address a bare phone number on the phone-number server.
#[must_use]
pub fn to_user_jid(phone: &str) -> String {
    if phone.contains('@') {
        phone.to_string()
    } else {
        format!("{phone}@{USER_SERVER}")
    }
}
