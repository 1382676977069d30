//! Echo server for BER-encoded elements.
//!
//! Each accepted client is served on its own task: complete BER elements
//! are framed from the byte stream and written straight back. Try it with
//! `printf '\x30\x03\x02\x01\x01' | nc 127.0.0.1 3890 | xxd`.

use wiresock::{
    FrameDecoder,
    FrameError,
    ListenSocket,
    TransportError,
    codec::{BerDecoder, IdentityBuilder},
};

#[tokio::main]
async fn main() -> Result<(), TransportError> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let listener = ListenSocket::bind_tcp("127.0.0.1", 3890).await?;
    tracing::info!(addr = ?listener.local_addr(), "ber echo server listening");

    loop {
        let Some(transport) = listener.accept(None).await? else {
            continue;
        };
        let id = transport.client_id();
        tokio::spawn(async move {
            let mut frames = FrameDecoder::new(transport, BerDecoder::default(), IdentityBuilder);
            loop {
                match frames.next().await {
                    Ok(element) => frames.source_mut().write(&element).await,
                    Err(FrameError::ConnectionLost) => break,
                    Err(err) => {
                        tracing::warn!(client = ?id, error = %err, "closing client");
                        break;
                    }
                }
            }
            frames.source_mut().close().await;
        });
    }
}
