//! Authorisation and registration handshakes on the sending connection.
//!
//! Login: greeting line, `<token>\n`, one JSON line with the account (or
//! `null` when the token is unknown).
//!
//! Registration: greeting line, an empty line to skip login, nickname
//! prompt, `<nickname>\n`, one JSON line with the new account.

use crate::error::ChatError;
use crate::messages::sanitize;
use crate::protocol::AccountInfo;
use crate::transport::{decode_line, LineReader, LineWriter};
use crate::watchdog::Liveness;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

/// Log in with `token` and return the account it belongs to
pub async fn authorise<R, W>(
    reader: &mut LineReader<R>,
    writer: &mut LineWriter<W>,
    token: &str,
    liveness: &Liveness,
) -> Result<AccountInfo, ChatError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    liveness.alive("Prompt before auth");
    let greeting = expect_line(reader).await?;
    debug!("Server greeting: {}", greeting);

    writer.write_line(token.trim()).await?;

    let response = expect_line(reader).await?;
    let account = parse_account(&response)?.ok_or(ChatError::InvalidToken)?;

    liveness.alive("Authorization done");
    info!("Authorised as {}", account.nickname);
    Ok(account)
}

/// Create a new account with `nickname`
pub async fn register<R, W>(
    reader: &mut LineReader<R>,
    writer: &mut LineWriter<W>,
    nickname: &str,
) -> Result<AccountInfo, ChatError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let nickname = normalize_nickname(nickname)?;

    expect_line(reader).await?;
    writer.write_line("").await?;

    let prompt = expect_line(reader).await?;
    debug!("Registration prompt: {}", prompt);
    writer.write_line(&nickname).await?;

    let response = expect_line(reader).await?;
    let account = parse_account(&response)?.ok_or_else(|| ChatError::MalformedResponse {
        line: response.clone(),
        source: serde::de::Error::custom("registration returned no account"),
    })?;

    info!("Registered as {}", account.nickname);
    Ok(account)
}

/// Strip escaped and real newlines plus surrounding blanks from a nickname.
/// Nothing left means there is nothing to register.
pub fn normalize_nickname(nickname: &str) -> Result<String, ChatError> {
    let nickname = sanitize(nickname).replace('\n', "");
    match nickname.trim() {
        "" => Err(ChatError::InvalidNickname),
        trimmed => Ok(trimmed.to_string()),
    }
}

/// Read one line, treating end-of-stream as a closed connection
async fn expect_line<R: AsyncRead + Unpin>(reader: &mut LineReader<R>) -> Result<String, ChatError> {
    let raw = reader.read_line().await?;
    if raw.is_empty() {
        return Err(ChatError::ConnectionClosed);
    }
    Ok(decode_line(&raw))
}

/// Parse the account line. `null` and `{}` mean "no account".
fn parse_account(line: &str) -> Result<Option<AccountInfo>, ChatError> {
    let malformed = |source| ChatError::MalformedResponse {
        line: line.to_string(),
        source,
    };

    let value: Value = serde_json::from_str(line).map_err(malformed)?;
    match value {
        Value::Null => Ok(None),
        Value::Object(ref map) if map.is_empty() => Ok(None),
        other => serde_json::from_value(other).map(Some).map_err(malformed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    type Client = (LineReader<ReadHalf<DuplexStream>>, LineWriter<WriteHalf<DuplexStream>>);
    type Server = (LineReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>);

    fn pipe() -> (Client, Server) {
        let (client, server) = tokio::io::duplex(1024);
        let (client_rd, client_wr) = tokio::io::split(client);
        let (server_rd, server_wr) = tokio::io::split(server);
        (
            (LineReader::new(client_rd), LineWriter::new(client_wr)),
            (LineReader::new(server_rd), server_wr),
        )
    }

    #[tokio::test]
    async fn test_authorise_success() {
        let ((mut reader, mut writer), (mut server_rd, mut server_wr)) = pipe();
        let (liveness, mut events) = Liveness::channel();

        let server = tokio::spawn(async move {
            server_wr.write_all(b"Hello %username%! Enter your token.\n").await.unwrap();
            let token = server_rd.read_line().await.unwrap();
            assert_eq!(token, b"secret-token\n");
            server_wr
                .write_all(b"{\"nickname\": \"Brave Cat\", \"account_hash\": \"secret-token\"}\n")
                .await
                .unwrap();
        });

        let account = authorise(&mut reader, &mut writer, "secret-token\n", &liveness)
            .await
            .unwrap();
        server.await.unwrap();

        assert_eq!(account.nickname, "Brave Cat");
        assert_eq!(events.recv().await.unwrap().reason, "Prompt before auth");
        assert_eq!(events.recv().await.unwrap().reason, "Authorization done");
    }

    #[tokio::test]
    async fn test_authorise_null_is_invalid_token() {
        let ((mut reader, mut writer), (mut server_rd, mut server_wr)) = pipe();
        let (liveness, mut events) = Liveness::channel();

        let server = tokio::spawn(async move {
            server_wr.write_all(b"Hello!\n").await.unwrap();
            server_rd.read_line().await.unwrap();
            server_wr.write_all(b"null\n").await.unwrap();
        });

        let result = authorise(&mut reader, &mut writer, "wrong", &liveness).await;
        server.await.unwrap();

        assert!(matches!(result, Err(ChatError::InvalidToken)));
        assert_eq!(events.recv().await.unwrap().reason, "Prompt before auth");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_authorise_garbage_is_malformed() {
        let ((mut reader, mut writer), (mut server_rd, mut server_wr)) = pipe();
        let (liveness, _events) = Liveness::channel();

        let server = tokio::spawn(async move {
            server_wr.write_all(b"Hello!\n").await.unwrap();
            server_rd.read_line().await.unwrap();
            server_wr.write_all(b"<html>\n").await.unwrap();
        });

        let result = authorise(&mut reader, &mut writer, "token", &liveness).await;
        server.await.unwrap();

        match result {
            Err(err @ ChatError::MalformedResponse { .. }) => assert!(err.is_transient()),
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_authorise_closed_before_greeting() {
        let ((mut reader, mut writer), server) = pipe();
        let (liveness, _events) = Liveness::channel();
        drop(server);

        let result = authorise(&mut reader, &mut writer, "token", &liveness).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_register_flow() {
        let ((mut reader, mut writer), (mut server_rd, mut server_wr)) = pipe();

        let server = tokio::spawn(async move {
            server_wr.write_all(b"Hello! Enter your token.\n").await.unwrap();
            assert_eq!(server_rd.read_line().await.unwrap(), b"\n");
            server_wr.write_all(b"Enter preferred nickname below:\n").await.unwrap();
            assert_eq!(server_rd.read_line().await.unwrap(), b"Fox\n");
            server_wr
                .write_all(b"{\"nickname\": \"Fox\", \"account_hash\": \"new-hash\"}\n")
                .await
                .unwrap();
        });

        let account = register(&mut reader, &mut writer, "Fox\\n\n").await.unwrap();
        server.await.unwrap();

        assert_eq!(
            account,
            AccountInfo {
                nickname: "Fox".to_string(),
                account_hash: "new-hash".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_register_rejects_empty_nickname() {
        let ((mut reader, mut writer), _server) = pipe();
        let result = register(&mut reader, &mut writer, "  \\n ").await;
        assert!(matches!(result, Err(ChatError::InvalidNickname)));
    }

    #[test]
    fn test_normalize_nickname() {
        assert_eq!(normalize_nickname(" Brave\\n Cat\n").unwrap(), "Brave Cat");
        assert!(matches!(normalize_nickname(""), Err(ChatError::InvalidNickname)));
        assert!(matches!(normalize_nickname("\\n\n  "), Err(ChatError::InvalidNickname)));
    }

    #[test]
    fn test_parse_account_empty_object() {
        assert!(parse_account("{}").unwrap().is_none());
        assert!(parse_account("null").unwrap().is_none());
    }
}
