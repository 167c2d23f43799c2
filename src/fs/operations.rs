use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

/// Makes sure the next write starts on a fresh line, so a record cut off by an interrupted
/// append can't swallow the one written after it.
///
/// Leaves the cursor at the end of the file. Returns whether a newline had to be written.
pub async fn ensure_trailing_newline(
    file: &mut (impl AsyncSeek + AsyncWrite + AsyncRead + Unpin),
) -> Result<bool, io::Error> {
    let length = file.seek(std::io::SeekFrom::End(0)).await?;
    if length == 0 {
        return Ok(false);
    }

    file.seek(std::io::SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;

    if last[0] == b'\n' {
        return Ok(false);
    }
    file.write_all(b"\n").await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anyhow::Result;
    use tempfile::tempfile;
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    use crate::fs::operations::ensure_trailing_newline;

    async fn contents(file: &mut tokio::fs::File) -> Result<String> {
        file.rewind().await?;
        let mut s = String::new();
        file.read_to_string(&mut s).await?;
        Ok(s)
    }

    #[tokio::test]
    async fn test_empty_file_untouched() -> Result<()> {
        let mut file = tokio::fs::File::from_std(tempfile()?);

        assert!(!ensure_trailing_newline(&mut file).await?);
        assert_eq!(contents(&mut file).await?, "");
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_line_untouched() -> Result<()> {
        let mut file = tempfile()?;
        file.write_all(b"{\"a\":1}\n")?;
        let mut file = tokio::fs::File::from_std(file);

        assert!(!ensure_trailing_newline(&mut file).await?);
        assert_eq!(file.stream_position().await?, 8);
        assert_eq!(contents(&mut file).await?, "{\"a\":1}\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_torn_line_terminated() -> Result<()> {
        let mut file = tempfile()?;
        file.write_all(b"{\"a\":1}\n{\"a\":")?;
        let mut file = tokio::fs::File::from_std(file);

        assert!(ensure_trailing_newline(&mut file).await?);
        assert_eq!(contents(&mut file).await?, "{\"a\":1}\n{\"a\":\n");
        Ok(())
    }
}
