//! Lenient deserializers for CMS text fields

use serde::Deserializer;

use super::rich_text::RichTextBlock;

/// Deserialize a text field given either as plain key text or as a rich
/// text array. Rich text blocks are flattened, joined by a space.
pub fn text_field<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, SeqAccess, Visitor};
    use std::fmt;

    struct TextOrRichText;

    impl<'de> Visitor<'de> for TextOrRichText {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or a rich text array")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_seq<S>(self, mut seq: S) -> Result<Self::Value, S::Error>
        where
            S: SeqAccess<'de>,
        {
            let mut parts = Vec::new();
            while let Some(block) = seq.next_element::<RichTextBlock>()? {
                parts.push(block.text);
            }
            Ok(parts.join(" "))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(String::new())
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(TextOrRichText)
}

/// Like [`text_field`], mapping blank text to `None`
pub fn optional_text_field<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = text_field(deserializer)?;
    Ok(Some(text).filter(|t| !t.trim().is_empty()))
}
