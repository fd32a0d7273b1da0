//! The RTMP handshake: C0/C1 from the client, S0/S1/S2 from the server,
//! then C2 to close the exchange. This implements the plain (non-digest)
//! handshake variant; a client that sends the complex-handshake digest
//! scheme is accepted the same way since the server never validates the
//! digest, only echoes the peer's random payload back as required by
//! the wire format.

use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use proto_types::{CoreError, CoreResult};

const RTMP_VERSION: u8 = 3;
const HANDSHAKE_SIZE: usize = 1536;

pub async fn server_handshake<S>(stream: &mut S) -> CoreResult<()>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    let mut c0 = [0u8; 1];
    stream.read_exact(&mut c0).await.map_err(net_err)?;
    if c0[0] != RTMP_VERSION {
        return Err(CoreError::Protocol(format!("unsupported RTMP version {}", c0[0])));
    }

    let mut c1 = [0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut c1).await.map_err(net_err)?;

    let mut s1 = [0u8; HANDSHAKE_SIZE];
    s1[0..4].copy_from_slice(&0u32.to_be_bytes());
    s1[4..8].copy_from_slice(&0u32.to_be_bytes());
    rand::thread_rng().fill_bytes(&mut s1[8..]);

    // S2 echoes C1 verbatim; S0 is the version byte.
    stream.write_all(&[RTMP_VERSION]).await.map_err(net_err)?;
    stream.write_all(&s1).await.map_err(net_err)?;
    stream.write_all(&c1).await.map_err(net_err)?;
    stream.flush().await.map_err(net_err)?;

    let mut c2 = [0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut c2).await.map_err(net_err)?;

    Ok(())
}

fn net_err(err: std::io::Error) -> CoreError {
    CoreError::Resource(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn handshake_completes_over_a_duplex_pipe() {
        let (mut server, mut client) = duplex(1 << 16);

        let client_task = tokio::spawn(async move {
            client.write_all(&[RTMP_VERSION]).await.unwrap();
            client.write_all(&[0u8; HANDSHAKE_SIZE]).await.unwrap();
            client.flush().await.unwrap();

            let mut s0 = [0u8; 1];
            client.read_exact(&mut s0).await.unwrap();
            let mut s1 = [0u8; HANDSHAKE_SIZE];
            client.read_exact(&mut s1).await.unwrap();
            let mut s2 = [0u8; HANDSHAKE_SIZE];
            client.read_exact(&mut s2).await.unwrap();

            client.write_all(&s1).await.unwrap();
            client.flush().await.unwrap();
            s0[0]
        });

        server_handshake(&mut server).await.unwrap();
        let s0_version = client_task.await.unwrap();
        assert_eq!(s0_version, RTMP_VERSION);
    }

    #[tokio::test]
    async fn rejects_unsupported_version() {
        let (mut server, mut client) = duplex(64);
        tokio::spawn(async move {
            let _ = client.write_all(&[9u8]).await;
        });
        let result = server_handshake(&mut server).await;
        assert!(matches!(result, Err(CoreError::Protocol(_))));
    }
}
