//! RFC 5322 / MIME rendering of outgoing mail for `users.messages.send`.

use crate::error::NexusError;
use crate::types::gmail::{OutgoingAttachment, SendEmailRequest};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use std::fmt::Write;

const LINE_WIDTH: usize = 76;

/// Sender identity stamped on every message.
pub struct Sender<'a> {
    pub display_name: &'a str,
    pub email: &'a str,
}

/// Per-message values that vary between sends.
pub struct Envelope<'a> {
    pub date: DateTime<Utc>,
    pub boundary: &'a str,
    pub message_id: &'a str,
}

/// Render `req` into a complete message. Header values with line breaks are refused.
pub fn render_message(
    req: &SendEmailRequest,
    sender: &Sender<'_>,
    env: &Envelope<'_>,
) -> Result<String, NexusError> {
    if req.to.trim().is_empty() {
        return Err(NexusError::BadRequest("recipient `to` is required".to_string()));
    }
    let headers = [
        ("To", Some(req.to.as_str())),
        ("Cc", req.cc.as_deref()),
        ("Bcc", req.bcc.as_deref()),
        ("Subject", Some(req.subject.as_str())),
        ("From", Some(sender.display_name)),
        ("From", Some(sender.email)),
    ];
    for (name, value) in headers {
        if value.is_some_and(|v| v.contains(['\r', '\n'])) {
            return Err(NexusError::BadRequest(format!(
                "header `{name}` must not contain line breaks"
            )));
        }
    }

    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write!(
        out,
        "From: {} <{}>\r\n",
        encode_display_name(sender.display_name),
        sender.email
    );
    let _ = write!(out, "To: {}\r\n", req.to.trim());
    if let Some(cc) = req.cc.as_deref().filter(|v| !v.trim().is_empty()) {
        let _ = write!(out, "Cc: {}\r\n", cc.trim());
    }
    if let Some(bcc) = req.bcc.as_deref().filter(|v| !v.trim().is_empty()) {
        let _ = write!(out, "Bcc: {}\r\n", bcc.trim());
    }
    let _ = write!(out, "Subject: {}\r\n", encode_header_word(&req.subject));
    let _ = write!(out, "Date: {}\r\n", env.date.to_rfc2822());
    let _ = write!(out, "Message-ID: <{}>\r\n", env.message_id);
    out.push_str("MIME-Version: 1.0\r\n");

    let body_type = if req.is_html { "text/html" } else { "text/plain" };

    if req.attachments.is_empty() {
        write_text_part(&mut out, body_type, &req.body);
        return Ok(out);
    }

    let _ = write!(
        out,
        "Content-Type: multipart/mixed; boundary=\"{}\"\r\n\r\n",
        env.boundary
    );
    out.push_str("This is a multi-part message in MIME format.\r\n\r\n");
    let _ = write!(out, "--{}\r\n", env.boundary);
    write_text_part(&mut out, body_type, &req.body);
    out.push_str("\r\n");
    for attachment in &req.attachments {
        let _ = write!(out, "--{}\r\n", env.boundary);
        write_attachment_part(&mut out, attachment)?;
    }
    let _ = write!(out, "--{}--\r\n", env.boundary);
    Ok(out)
}

fn write_text_part(out: &mut String, content_type: &str, body: &str) {
    let _ = write!(out, "Content-Type: {content_type}; charset=utf-8\r\n");
    out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
    out.push_str(&wrap_base64(&STANDARD.encode(body.as_bytes())));
}

fn write_attachment_part(out: &mut String, att: &OutgoingAttachment) -> Result<(), NexusError> {
    let bytes = STANDARD
        .decode(att.content_base64.trim())
        .map_err(|_| {
            NexusError::BadRequest(format!("attachment `{}` is not valid base64", att.filename))
        })?;
    let filename = sanitize_filename(&att.filename);
    let mime_type = if att.mime_type.contains(['\r', '\n', ';']) {
        "application/octet-stream"
    } else {
        att.mime_type.as_str()
    };
    let _ = write!(out, "Content-Type: {mime_type}; name=\"{filename}\"\r\n");
    let _ = write!(
        out,
        "Content-Disposition: attachment; filename=\"{filename}\"\r\n"
    );
    out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
    out.push_str(&wrap_base64(&STANDARD.encode(&bytes)));
    out.push_str("\r\n");
    Ok(())
}

/// Split into 76-column lines, each CRLF terminated.
fn wrap_base64(encoded: &str) -> String {
    let mut out = String::with_capacity(encoded.len() + encoded.len() / LINE_WIDTH * 2 + 2);
    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        // base64 output is ASCII
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push_str("\r\n");
    }
    out
}

fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '"' | '\\' | '\r' | '\n'))
        .collect();
    if cleaned.trim().is_empty() {
        "attachment".to_string()
    } else {
        cleaned
    }
}

/// Bytes of UTF-8 per encoded-word; keeps each word under 75 characters.
const ENCODED_WORD_BYTES: usize = 45;

/// RFC 2047 encoded-words for non-ASCII header text, folded one word per line.
fn encode_header_word(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }
    let mut words = Vec::new();
    let mut start = 0;
    let mut end = 0;
    for (idx, ch) in value.char_indices() {
        let next = idx + ch.len_utf8();
        if next - start > ENCODED_WORD_BYTES {
            words.push(&value[start..end]);
            start = end;
        }
        end = next;
    }
    words.push(&value[start..end]);
    words
        .into_iter()
        .map(|chunk| format!("=?UTF-8?B?{}?=", STANDARD.encode(chunk.as_bytes())))
        .collect::<Vec<_>>()
        .join("\r\n ")
}

fn encode_display_name(name: &str) -> String {
    if name.is_ascii() {
        format!("\"{}\"", name.replace(['"', '\\'], ""))
    } else {
        encode_header_word(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(attachments: Vec<OutgoingAttachment>) -> SendEmailRequest {
        SendEmailRequest {
            to: "client@example.be".into(),
            subject: "Votre devis".into(),
            body: "Bonjour".into(),
            is_html: false,
            cc: Some("boss@acme.be".into()),
            bcc: None,
            from_name: None,
            attachments,
        }
    }

    fn render(req: &SendEmailRequest) -> Result<String, NexusError> {
        render_message(
            req,
            &Sender {
                display_name: "2Thier CRM",
                email: "admin@acme.be",
            },
            &Envelope {
                date: Utc::now(),
                boundary: "b0undary",
                message_id: "id@acme.be",
            },
        )
    }

    #[test]
    fn long_non_ascii_subject_is_folded_into_short_encoded_words() {
        let subject = "Résumé de votre dossier de rénovation énergétique à Liège, étape numéro deux";
        let encoded = encode_header_word(subject);
        let words: Vec<&str> = encoded.split("\r\n ").collect();
        assert!(words.len() > 1);

        let mut decoded = Vec::new();
        for word in &words {
            assert!(word.len() <= 75, "{word} is too long");
            let payload = word
                .strip_prefix("=?UTF-8?B?")
                .and_then(|w| w.strip_suffix("?="))
                .expect("encoded-word");
            decoded.extend(STANDARD.decode(payload).unwrap());
        }
        assert_eq!(String::from_utf8(decoded).unwrap(), subject);
        assert_eq!(encode_header_word("Devis"), "Devis");
    }

    #[test]
    fn plain_message_has_sender_and_single_part() {
        let raw = render(&request(vec![])).unwrap();
        assert!(raw.starts_with("From: \"2Thier CRM\" <admin@acme.be>\r\n"));
        assert!(raw.contains("Cc: boss@acme.be\r\n"));
        assert!(!raw.contains("Bcc:"));
        assert!(raw.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(!raw.contains("multipart"));
        assert!(raw.ends_with(&format!("{}\r\n", STANDARD.encode("Bonjour"))));
    }

    #[test]
    fn attachments_make_multipart_with_wrapped_base64() {
        let payload = vec![7u8; 300];
        let raw = render(&request(vec![OutgoingAttachment {
            filename: "devis.pdf".into(),
            mime_type: "application/pdf".into(),
            content_base64: STANDARD.encode(&payload),
        }]))
        .unwrap();

        assert!(raw.contains("Content-Type: multipart/mixed; boundary=\"b0undary\""));
        assert!(raw.contains("Content-Disposition: attachment; filename=\"devis.pdf\""));
        assert!(raw.trim_end().ends_with("--b0undary--"));
        assert!(raw.split("\r\n").all(|line| line.len() <= 998));
        let longest_b64 = raw
            .split("\r\n")
            .filter(|l| !l.contains(':') && !l.starts_with("--"))
            .map(str::len)
            .max()
            .unwrap();
        assert_eq!(longest_b64, LINE_WIDTH);
    }

    #[test]
    fn header_injection_is_refused() {
        let mut req = request(vec![]);
        req.subject = "hi\r\nBcc: victim@x.be".into();
        assert!(matches!(render(&req), Err(NexusError::BadRequest(_))));
    }

    #[test]
    fn invalid_attachment_base64_is_a_bad_request() {
        let req = request(vec![OutgoingAttachment {
            filename: "x.bin".into(),
            mime_type: "application/octet-stream".into(),
            content_base64: "***".into(),
        }]);
        assert!(matches!(render(&req), Err(NexusError::BadRequest(_))));
    }

    #[test]
    fn non_ascii_subject_is_encoded() {
        let mut req = request(vec![]);
        req.subject = "Révision".into();
        let raw = render(&req).unwrap();
        assert!(raw.contains("Subject: =?UTF-8?B?"));
    }
}
