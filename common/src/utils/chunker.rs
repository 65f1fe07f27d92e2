use crate::error::AppError;

/// One chunk emitted by the markdown chunker, tagged with the heading path
/// (`"H1 > H2 > …"`) that was active when it was cut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPiece {
    pub content: String,
    pub heading_path: String,
}

struct Paragraph {
    text: String,
    heading_path: String,
    is_heading: bool,
}

/// Heading-aware markdown chunker.
///
/// Headings (`#`, `##`, …) push/pop a level stack and are emitted as their
/// own chunks. Adjacent paragraphs under the same heading path concatenate
/// with a blank line up to `chunk_size`; a paragraph longer than `chunk_size`
/// is sliced into windows carrying `overlap` trailing characters into the
/// next window. Requires `chunk_size > overlap`. Every emitted chunk is at
/// most `chunk_size` characters.
pub fn chunk_markdown(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<ChunkPiece>, AppError> {
    if chunk_size <= overlap {
        return Err(AppError::Validation(
            "chunk_size must be greater than overlap".into(),
        ));
    }

    let paragraphs = split_paragraphs(text);

    let mut chunks: Vec<ChunkPiece> = Vec::new();
    let mut buf = String::new();
    let mut buf_heading = String::new();

    for para in paragraphs {
        if para.is_heading {
            push_chunk(&mut chunks, &buf, &buf_heading);
            buf.clear();
            buf_heading.clear();
            emit_windows(
                &mut chunks,
                &para.text,
                &para.heading_path,
                chunk_size,
                overlap,
            );
            continue;
        }

        let heading_changed = !buf.is_empty()
            && !para.heading_path.is_empty()
            && !buf_heading.is_empty()
            && para.heading_path != buf_heading;
        if heading_changed {
            push_chunk(&mut chunks, &buf, &buf_heading);
            buf.clear();
            buf_heading.clear();
        }

        if para.text.chars().count() >= chunk_size {
            if !buf.is_empty() {
                push_chunk(&mut chunks, &buf, &buf_heading);
                buf.clear();
                buf_heading.clear();
            }
            emit_windows(
                &mut chunks,
                &para.text,
                &para.heading_path,
                chunk_size,
                overlap,
            );
            continue;
        }

        if buf.is_empty() {
            buf = para.text;
            buf_heading = para.heading_path;
            continue;
        }

        let candidate_len = buf.chars().count() + 2 + para.text.chars().count();
        if candidate_len <= chunk_size {
            buf.push_str("\n\n");
            buf.push_str(&para.text);
        } else {
            push_chunk(&mut chunks, &buf, &buf_heading);
            buf = para.text;
            buf_heading = para.heading_path;
        }
    }

    push_chunk(&mut chunks, &buf, &buf_heading);

    Ok(chunks)
}

fn split_paragraphs(text: &str) -> Vec<Paragraph> {
    let mut paragraphs: Vec<Paragraph> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut heading_stack: Vec<(usize, String)> = Vec::new();

    for line in text.lines() {
        let stripped = line.trim();

        if stripped.starts_with('#') {
            flush_paragraph(&mut paragraphs, &mut current, &heading_stack);

            let level = stripped.chars().take_while(|c| *c == '#').count();
            let heading_text = stripped.trim_start_matches('#').trim().to_owned();
            while heading_stack
                .last()
                .is_some_and(|(existing, _)| *existing >= level)
            {
                heading_stack.pop();
            }
            heading_stack.push((level, heading_text));

            paragraphs.push(Paragraph {
                text: stripped.to_owned(),
                heading_path: heading_path(&heading_stack),
                is_heading: true,
            });
            continue;
        }

        if stripped.is_empty() {
            flush_paragraph(&mut paragraphs, &mut current, &heading_stack);
            continue;
        }

        current.push(stripped.to_owned());
    }
    flush_paragraph(&mut paragraphs, &mut current, &heading_stack);

    paragraphs
}

fn flush_paragraph(
    paragraphs: &mut Vec<Paragraph>,
    current: &mut Vec<String>,
    heading_stack: &[(usize, String)],
) {
    if current.is_empty() {
        return;
    }
    let text = current.join("\n").trim().to_owned();
    current.clear();
    if text.is_empty() {
        return;
    }
    paragraphs.push(Paragraph {
        text,
        heading_path: heading_path(heading_stack),
        is_heading: false,
    });
}

fn heading_path(stack: &[(usize, String)]) -> String {
    stack
        .iter()
        .filter(|(_, title)| !title.is_empty())
        .map(|(_, title)| title.as_str())
        .collect::<Vec<_>>()
        .join(" > ")
}

fn push_chunk(chunks: &mut Vec<ChunkPiece>, value: &str, heading_path: &str) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return;
    }
    chunks.push(ChunkPiece {
        content: trimmed.to_owned(),
        heading_path: heading_path.to_owned(),
    });
}

/// Emit `text` directly when it fits, else as `chunk_size` windows with
/// `overlap` characters of trailing context carried forward.
fn emit_windows(
    chunks: &mut Vec<ChunkPiece>,
    text: &str,
    heading_path: &str,
    chunk_size: usize,
    overlap: usize,
) {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < chunk_size {
        push_chunk(chunks, text, heading_path);
        return;
    }

    let mut start = 0usize;
    loop {
        let end = (start + chunk_size).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        push_chunk(chunks, &window, heading_path);
        if end == chars.len() {
            break;
        }
        start = end - overlap;
    }
}
