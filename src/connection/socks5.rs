//! SOCKS5 CONNECT client (RFC 1928, no authentication)

use crate::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::net::IpAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const SOCKS5_VERSION: u8 = 0x05;
const AUTH_NONE: u8 = 0x00;
const AUTH_NO_ACCEPTABLE: u8 = 0xFF;

const CMD_CONNECT: u8 = 0x01;
const RESERVED: u8 = 0x00;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

const REP_SUCCESS: u8 = 0x00;

/// Human-readable meaning of a SOCKS5 reply code
fn reply_message(code: u8) -> &'static str {
    match code {
        0x01 => "general SOCKS server failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown reply code",
    }
}

/// Encode a CONNECT request for `host:port`
fn encode_connect_request(host: &str, port: u16) -> Result<BytesMut> {
    let mut request = BytesMut::with_capacity(6 + host.len() + 1);
    request.put_slice(&[SOCKS5_VERSION, CMD_CONNECT, RESERVED]);

    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            request.put_u8(ATYP_IPV4);
            request.put_slice(&ip.octets());
        }
        Ok(IpAddr::V6(ip)) => {
            request.put_u8(ATYP_IPV6);
            request.put_slice(&ip.octets());
        }
        Err(_) => {
            let len = u8::try_from(host.len())
                .map_err(|_| Error::Proxy(format!("target host name too long: {}", host)))?;
            request.put_u8(ATYP_DOMAIN);
            request.put_u8(len);
            request.put_slice(host.as_bytes());
        }
    }

    request.put_u16(port);
    Ok(request)
}

/// Negotiate a CONNECT to `host:port` over an already-open proxy stream.
///
/// On success the stream is a tunnel to the target; bytes written after this
/// returns go to the target.
pub async fn connect<S>(stream: &mut S, host: &str, port: u16) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Greeting: one method, no authentication
    stream
        .write_all(&[SOCKS5_VERSION, 0x01, AUTH_NONE])
        .await
        .map_err(|e| Error::Proxy(format!("failed to send greeting: {}", e)))?;

    let mut method = [0u8; 2];
    stream
        .read_exact(&mut method)
        .await
        .map_err(|e| Error::Proxy(format!("failed to read method selection: {}", e)))?;

    if method[0] != SOCKS5_VERSION {
        return Err(Error::Proxy(format!(
            "unsupported SOCKS version in reply: {}",
            method[0]
        )));
    }
    match method[1] {
        AUTH_NONE => {}
        AUTH_NO_ACCEPTABLE => {
            return Err(Error::Proxy(
                "proxy requires authentication, none configured".into(),
            ))
        }
        other => {
            return Err(Error::Proxy(format!(
                "proxy selected unsupported auth method 0x{:02X}",
                other
            )))
        }
    }

    let request = encode_connect_request(host, port)?;
    stream
        .write_all(&request)
        .await
        .map_err(|e| Error::Proxy(format!("failed to send connect request: {}", e)))?;

    let mut header = [0u8; 4];
    stream
        .read_exact(&mut header)
        .await
        .map_err(|e| Error::Proxy(format!("failed to read connect reply: {}", e)))?;

    if header[0] != SOCKS5_VERSION {
        return Err(Error::Proxy(format!(
            "unsupported SOCKS version in reply: {}",
            header[0]
        )));
    }
    if header[1] != REP_SUCCESS {
        return Err(Error::Proxy(format!(
            "connect to {}:{} rejected: {}",
            host,
            port,
            reply_message(header[1])
        )));
    }

    // Skip the bound address and port
    let remaining = match header[3] {
        ATYP_IPV4 => 4 + 2,
        ATYP_IPV6 => 16 + 2,
        ATYP_DOMAIN => {
            let len = stream
                .read_u8()
                .await
                .map_err(|e| Error::Proxy(format!("failed to read bound address: {}", e)))?;
            len as usize + 2
        }
        other => {
            return Err(Error::Proxy(format!(
                "unsupported bound address type: {}",
                other
            )))
        }
    };
    let mut bound = vec![0u8; remaining];
    stream
        .read_exact(&mut bound)
        .await
        .map_err(|e| Error::Proxy(format!("failed to read bound address: {}", e)))?;

    Ok(())
}
