//! Recipient address redaction for logs

/// Mask the middle of an address's local part, keeping its first and last
/// characters and the domain
///
/// `john.doe@example.com` becomes `j******e@example.com`. Local parts shorter
/// than three characters and values without an `@` are returned unchanged.
pub fn mask_email(email: &str) -> String {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return email.to_string();
    };

    let chars: Vec<char> = local.chars().collect();
    let [first, middle @ .., last] = chars.as_slice() else {
        return email.to_string();
    };
    if middle.is_empty() {
        return email.to_string();
    }

    let mut masked = String::with_capacity(email.len());
    masked.push(*first);
    masked.extend(middle.iter().map(|_| '*'));
    masked.push(*last);
    masked.push('@');
    masked.push_str(domain);
    masked
}
