// SPDX-License-Identifier: AGPL-3.0-or-later
//! Converters for each export format

pub mod html;
pub mod json;
pub mod markdown;
pub mod plaintext;
pub mod stub;

pub use html::{EditorRenderer, HtmlConverter, TiptapHtmlRenderer};
pub use json::JsonConverter;
pub use markdown::MarkdownConverter;
pub use plaintext::PlainTextConverter;
pub use stub::{DocxStub, PdfStub};
