//! Minimal FastCGI responder client, enough to run one script through a PHP-FPM pool.
//!
//! One request per connection, no multiplexing, no keep-alive.
use std::io::{self, Read, Write};

const VERSION: u8 = 1;
const BEGIN_REQUEST: u8 = 1;
const END_REQUEST: u8 = 3;
const PARAMS: u8 = 4;
const STDIN: u8 = 5;
const STDOUT: u8 = 6;
const STDERR: u8 = 7;
const ROLE_RESPONDER: u16 = 1;
const REQUEST_ID: u16 = 1;
const MAX_CONTENT: usize = 0xffff;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Response {
    /// CGI output: headers, blank line, body.
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub app_status: u32,
    /// 0 is `FCGI_REQUEST_COMPLETE`.
    pub protocol_status: u8,
}

impl Response {
    /// Status from a `Status:` header; CGI defaults to 200 without one.
    pub fn status(&self) -> u16 {
        let text = String::from_utf8_lossy(&self.stdout);
        let head = text.split("\r\n\r\n").next().unwrap_or_default();
        head.lines()
            .find_map(|l| {
                let (k, v) = l.split_once(':')?;
                k.trim().eq_ignore_ascii_case("status").then(|| v.trim().to_string())
            })
            .and_then(|v| v.split_whitespace().next()?.parse().ok())
            .unwrap_or(200)
    }

    pub fn body(&self) -> &[u8] {
        let pos = self.stdout.windows(4).position(|w| w == b"\r\n\r\n");
        pos.map_or(&self.stdout[..], |p| &self.stdout[p + 4..])
    }
}

fn write_record(out: &mut impl Write, kind: u8, content: &[u8]) -> io::Result<()> {
    let len = u16::try_from(content.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "fastcgi record too large"))?;
    let padding = (8 - content.len() % 8) % 8;
    let [id_hi, id_lo] = REQUEST_ID.to_be_bytes();
    let [len_hi, len_lo] = len.to_be_bytes();
    #[allow(clippy::cast_possible_truncation)]
    let header = [VERSION, kind, id_hi, id_lo, len_hi, len_lo, padding as u8, 0];
    out.write_all(&header)?;
    out.write_all(content)?;
    out.write_all(&[0u8; 8][..padding])
}

fn push_len(buf: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        #[allow(clippy::cast_possible_truncation)]
        buf.push(len as u8);
    } else {
        #[allow(clippy::cast_possible_truncation)]
        buf.extend_from_slice(&((len as u32) | 0x8000_0000).to_be_bytes());
    }
}

pub(crate) fn encode_params(params: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (name, value) in params {
        push_len(&mut buf, name.len());
        push_len(&mut buf, value.len());
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(value.as_bytes());
    }
    buf
}

/// Send one responder request with `params` and an empty body, then read until
/// `END_REQUEST`.
///
/// # Errors
///
/// Propagates I/O errors, including read timeouts configured on `stream`, and
/// returns `InvalidData` for malformed records.
pub(crate) fn request<S: Read + Write>(stream: &mut S, params: &[(&str, &str)]) -> io::Result<Response> {
    let [role_hi, role_lo] = ROLE_RESPONDER.to_be_bytes();
    write_record(stream, BEGIN_REQUEST, &[role_hi, role_lo, 0, 0, 0, 0, 0, 0])?;
    let encoded = encode_params(params);
    for chunk in encoded.chunks(MAX_CONTENT) {
        write_record(stream, PARAMS, chunk)?;
    }
    write_record(stream, PARAMS, &[])?;
    write_record(stream, STDIN, &[])?;
    stream.flush()?;

    let mut resp = Response::default();
    loop {
        let mut header = [0u8; 8];
        stream.read_exact(&mut header)?;
        if header[0] != VERSION {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "unexpected fastcgi version"));
        }
        let len = usize::from(u16::from_be_bytes([header[4], header[5]]));
        let padding = usize::from(header[6]);
        let mut content = vec![0u8; len + padding];
        stream.read_exact(&mut content)?;
        content.truncate(len);
        match header[1] {
            STDOUT => resp.stdout.extend_from_slice(&content),
            STDERR => resp.stderr.extend_from_slice(&content),
            END_REQUEST => {
                if content.len() < 5 {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "short fastcgi end record"));
                }
                resp.app_status = u32::from_be_bytes([content[0], content[1], content[2], content[3]]);
                resp.protocol_status = content[4];
                return Ok(resp);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    /// Read one request off `conn` and return its decoded params.
    pub(crate) fn read_request(conn: &mut impl Read) -> Vec<(String, String)> {
        let mut params = Vec::new();
        loop {
            let mut header = [0u8; 8];
            conn.read_exact(&mut header).unwrap();
            let len = usize::from(u16::from_be_bytes([header[4], header[5]]));
            let mut content = vec![0u8; len + usize::from(header[6])];
            conn.read_exact(&mut content).unwrap();
            content.truncate(len);
            match header[1] {
                PARAMS => params.extend_from_slice(&content),
                STDIN if len == 0 => break,
                _ => {}
            }
        }
        decode_params(&params)
    }

    fn decode_len(buf: &[u8], at: &mut usize) -> usize {
        if buf[*at] < 0x80 {
            *at += 1;
            usize::from(buf[*at - 1])
        } else {
            let v = u32::from_be_bytes([buf[*at], buf[*at + 1], buf[*at + 2], buf[*at + 3]]) & 0x7fff_ffff;
            *at += 4;
            v as usize
        }
    }

    fn decode_params(buf: &[u8]) -> Vec<(String, String)> {
        let mut at = 0;
        let mut out = Vec::new();
        while at < buf.len() {
            let n = decode_len(buf, &mut at);
            let v = decode_len(buf, &mut at);
            let name = String::from_utf8_lossy(&buf[at..at + n]).into_owned();
            let value = String::from_utf8_lossy(&buf[at + n..at + n + v]).into_owned();
            at += n + v;
            out.push((name, value));
        }
        out
    }

    /// Answer with `stdout` split over two records, then a completed end record.
    pub(crate) fn respond(conn: &mut impl Write, stdout: &[u8]) {
        let (a, b) = stdout.split_at(stdout.len() / 2);
        write_record(conn, STDOUT, a).unwrap();
        write_record(conn, STDOUT, b).unwrap();
        write_record(conn, STDOUT, &[]).unwrap();
        write_record(conn, END_REQUEST, &[0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
    }

    #[test]
    fn long_values_use_four_byte_lengths() {
        let long = "x".repeat(300);
        let encoded = encode_params(&[("SCRIPT_FILENAME", &long), ("A", "b")]);
        assert_eq!(encoded[0], 15);
        assert_eq!(&encoded[1..5], &(300u32 | 0x8000_0000).to_be_bytes());
        let decoded = decode_params(&encoded);
        assert_eq!(decoded[0].1.len(), 300);
        assert_eq!(decoded[1], ("A".to_string(), "b".to_string()));
    }

    #[test]
    fn request_round_trips_over_a_socket_pair() {
        let (mut client, mut server) = UnixStream::pair().unwrap();
        let fpm = std::thread::spawn(move || {
            let params = read_request(&mut server);
            respond(&mut server, b"Content-type: text/html\r\n\r\nhello");
            params
        });
        let resp = request(&mut client, &[("REQUEST_METHOD", "GET"), ("SCRIPT_FILENAME", "/x.php")]).unwrap();
        let params = fpm.join().unwrap();

        assert_eq!(params[1], ("SCRIPT_FILENAME".to_string(), "/x.php".to_string()));
        assert_eq!(resp.protocol_status, 0);
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.body(), b"hello");
    }

    #[test]
    fn status_header_is_honored() {
        let resp = Response {
            stdout: b"Status: 404 Not Found\r\nContent-type: text/html\r\n\r\nFile not found.".to_vec(),
            ..Response::default()
        };
        assert_eq!(resp.status(), 404);
        assert_eq!(resp.body(), b"File not found.");
    }
}
