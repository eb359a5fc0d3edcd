pub mod enums;

pub fn split_text(text: &str, chunk_size: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![];
    }
    text.chars()
        .collect::<Vec<_>>()
        .chunks(chunk_size)
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_text("hello", 4000), vec!["hello".to_string()]);
    }

    #[test]
    fn long_text_is_chunked() {
        let text = "a".repeat(4001);
        let parts = split_text(&text, 4000);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 4000);
        assert_eq!(parts[1].len(), 1);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(split_text("", 4000).is_empty());
    }
}
