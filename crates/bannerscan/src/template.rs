use std::net::Ipv4Addr;

/// Placeholder substituted with the target's dotted-quad address.
const PLACEHOLDER: &[u8] = b"%s";
/// At most this many occurrences are substituted; the rest are left literal.
const MAX_SUBSTITUTIONS: usize = 4;

/// Renders `template`, replacing up to [`MAX_SUBSTITUTIONS`] occurrences of
/// `%s` with `ip`'s dotted-quad form. Occurrences past the fourth are left
/// untouched.
pub fn render(template: &[u8], ip: Ipv4Addr) -> Vec<u8> {
    let addr = ip.to_string();
    let addr = addr.as_bytes();

    let mut out = Vec::with_capacity(template.len() + MAX_SUBSTITUTIONS * addr.len());
    let mut substituted = 0;
    let mut i = 0;
    while i < template.len() {
        if substituted < MAX_SUBSTITUTIONS && template[i..].starts_with(PLACEHOLDER) {
            out.extend_from_slice(addr);
            substituted += 1;
            i += PLACEHOLDER.len();
        } else {
            out.push(template[i]);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip() -> Ipv4Addr {
        Ipv4Addr::new(192, 0, 2, 1)
    }

    #[test]
    fn substitutes_single_placeholder() {
        assert_eq!(render(b"GET / HTTP/1.0\r\nHost: %s\r\n\r\n", ip()), b"GET / HTTP/1.0\r\nHost: 192.0.2.1\r\n\r\n".to_vec());
    }

    #[test]
    fn substitutes_up_to_four_and_leaves_rest_literal() {
        let tmpl = b"%s %s %s %s %s".to_vec();
        let rendered = render(&tmpl, ip());
        assert_eq!(rendered, b"192.0.2.1 192.0.2.1 192.0.2.1 192.0.2.1 %s".to_vec());
    }

    #[test]
    fn no_placeholder_is_passthrough() {
        assert_eq!(render(b"HELLO\n", ip()), b"HELLO\n".to_vec());
    }

    #[test]
    fn empty_template() {
        assert_eq!(render(b"", ip()), Vec::<u8>::new());
    }
}
