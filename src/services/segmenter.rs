//! 文本切分 - 业务能力层
//!
//! 把归一化后的文档文本切成若干块，每块不超过模型上下文预算。
//!
//! 1. 优先按题号切分（`1.`、`(2)`、`③`、`第4题`、`Question 5`），至少要找到两个题号
//! 2. 题号不足时按分隔符切分：在预算的后 40% 范围内依次寻找空行、换行、句末标点，
//!    都找不到才硬切
//! 3. 相邻单元贪心合并，直到达到预算
//! 4. 除第一块外，每块前面拼上前一块末尾的一段作为重叠
//! 5. 根据末尾特征判断该块是否"看起来没结束"
//!
//! 切分只是启发式：切错的边界最多造成重复或残缺的题目，由合并去重和人工复核兜底。

use anyhow::Result;
use regex::Regex;

/// 切分参数（单位均为字符）
#[derive(Debug, Clone, Copy)]
pub struct SegmenterConfig {
    pub max_chunk_chars: usize,
    pub overlap_chars: usize,
    /// 块正文达到这个长度后，如果加上重叠会超出预算，就不再加重叠
    pub min_chunk_chars: usize,
    /// 判断"没结束"时检查的末尾窗口
    pub tail_window_chars: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 6000,
            overlap_chars: 300,
            min_chunk_chars: 1500,
            tail_window_chars: 200,
        }
    }
}

/// 一块待发送给模型的文本
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// 重叠前缀 + 正文
    pub content: String,
    /// 正文在原文中的起始位置（字符偏移）
    pub offset: usize,
    /// 重叠前缀的字符数
    pub overlap_chars: usize,
    pub looks_incomplete: bool,
}

impl Chunk {
    /// 去掉重叠前缀后的正文
    pub fn body(&self) -> &str {
        let start = self
            .content
            .char_indices()
            .nth(self.overlap_chars)
            .map(|(i, _)| i)
            .unwrap_or(self.content.len());
        &self.content[start..]
    }
}

/// 文本切分器
pub struct TextSegmenter {
    config: SegmenterConfig,
    marker_re: Regex,
    open_label_re: Regex,
    option_label_re: Regex,
}

const SENTENCE_ENDINGS: &[char] = &['。', '！', '？', '；', '.', '!', '?', ';'];
const LIST_SEPARATORS: &[char] = &[',', '，', '、', ';', '；', ':', '：'];

impl TextSegmenter {
    pub fn new(config: SegmenterConfig) -> Result<Self> {
        Ok(Self {
            config,
            marker_re: Regex::new(
                r"(?m)^[ \t]*(?:\d{1,3}[ \t]*[.．、][^\d]|[(（]\d{1,3}[)）]|[①-⑳]|第[ \t]*\d{1,3}[ \t]*题|(?i:question)[ \t]*\d{1,3})",
            )?,
            open_label_re: Regex::new(r"(?:^|\s)(?:[A-H][.．、:：]|[(（][A-H][)）])$")?,
            option_label_re: Regex::new(r"(?:^|[\s(（])[A-H][.．、]")?,
        })
    }

    /// 切分文本
    pub fn segment(&self, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let max = self.config.max_chunk_chars.max(1);

        if chars.len() <= max {
            return vec![Chunk {
                content: text.to_string(),
                offset: 0,
                overlap_chars: 0,
                looks_incomplete: self.looks_incomplete(text),
            }];
        }

        let units = self.candidate_units(text, &chars, max);
        let ranges = merge_units(&units, max);
        self.build_chunks(&chars, &ranges)
    }

    /// 题号所在行的起始位置（字符偏移，升序去重）
    pub fn question_markers(&self, text: &str) -> Vec<usize> {
        let byte_offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        let mut markers: Vec<usize> = self
            .marker_re
            .find_iter(text)
            .filter_map(|m| byte_offsets.binary_search(&m.start()).ok())
            .collect();
        markers.dedup();
        markers
    }

    /// 判断块正文末尾是否像是被截断的题目
    pub fn looks_incomplete(&self, body: &str) -> bool {
        let trimmed = body.trim_end();
        if trimmed.is_empty() {
            return false;
        }

        let tail = tail_chars(trimmed, self.config.tail_window_chars);

        // 选项标签后面没有内容，例如 "... C."
        if self.open_label_re.is_match(tail) {
            return true;
        }

        // 未闭合的括号
        let last_open = tail.rfind(['(', '（']);
        let last_close = tail.rfind([')', '）']);
        if let Some(open) = last_open {
            if last_close.map_or(true, |close| close < open) {
                return true;
            }
        }

        // 以列举分隔符结尾
        if trimmed.ends_with(LIST_SEPARATORS) {
            return true;
        }

        // 末尾只出现了一个选项标签，后面的选项多半在下一块
        self.option_label_re.find_iter(tail).count() == 1
    }

    /// 候选单元：优先题号，其次分隔符
    fn candidate_units(&self, text: &str, chars: &[char], max: usize) -> Vec<(usize, usize)> {
        let markers = self.question_markers(text);

        if markers.len() >= 2 {
            let mut bounds: Vec<usize> = Vec::with_capacity(markers.len() + 2);
            bounds.push(0);
            bounds.extend(markers.into_iter().filter(|&m| m > 0));
            bounds.push(chars.len());

            let mut units = Vec::new();
            for pair in bounds.windows(2) {
                let (start, end) = (pair[0], pair[1]);
                if end - start > max {
                    units.extend(split_by_separators(chars, start, end, max));
                } else if end > start {
                    units.push((start, end));
                }
            }
            return units;
        }

        split_by_separators(chars, 0, chars.len(), max)
    }

    fn build_chunks(&self, chars: &[char], ranges: &[(usize, usize)]) -> Vec<Chunk> {
        let mut chunks = Vec::with_capacity(ranges.len());

        for (index, &(start, end)) in ranges.iter().enumerate() {
            let body: String = chars[start..end].iter().collect();
            let looks_incomplete = self.looks_incomplete(&body);

            let mut overlap = 0;
            if index > 0 {
                let (prev_start, prev_end) = ranges[index - 1];
                let body_len = end - start;
                let candidate = self.config.overlap_chars.min(prev_end - prev_start);
                let oversized = body_len >= self.config.min_chunk_chars
                    && body_len + candidate > self.config.max_chunk_chars;
                if !oversized {
                    overlap = candidate;
                }
            }

            let mut content: String = chars[start - overlap..start].iter().collect();
            content.push_str(&body);

            chunks.push(Chunk {
                content,
                offset: start,
                overlap_chars: overlap,
                looks_incomplete,
            });
        }

        chunks
    }
}

/// 文本模式下，把下一块正文的开头接到"没结束"的块后面
pub fn augment_with_lead_in(chunks: &[Chunk], index: usize, lead_in_chars: usize) -> String {
    let chunk = &chunks[index];
    match chunks.get(index + 1) {
        Some(next) if chunk.looks_incomplete && lead_in_chars > 0 => {
            let lead_in: String = next.body().chars().take(lead_in_chars).collect();
            format!("{}{}", chunk.content, lead_in)
        }
        _ => chunk.content.clone(),
    }
}

/// 文本归一化：统一换行、去掉 BOM 和全角空格、压缩多余空行
pub fn normalize_text(raw: &str) -> String {
    let text = raw
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{feff}', "")
        .replace(['\u{3000}', '\u{a0}'], " ");

    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    out.trim().to_string()
}

/// 在 (pos + 60% 预算, pos + 预算] 范围内寻找切分点
fn split_by_separators(
    chars: &[char],
    start: usize,
    end: usize,
    max: usize,
) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut pos = start;

    while end - pos > max {
        let window_end = pos + max;
        let floor = (pos + max * 6 / 10).max(pos + 1);
        let cut = find_cut(chars, floor, window_end).unwrap_or(window_end);
        ranges.push((pos, cut));
        pos = cut;
    }

    if pos < end {
        ranges.push((pos, end));
    }
    ranges
}

/// 切分点 c 表示在 chars[c] 之前切开；按 空行 > 换行 > 句末标点 的优先级从后往前找
fn find_cut(chars: &[char], floor: usize, window_end: usize) -> Option<usize> {
    let candidates = || (floor..=window_end).rev();

    let double_newline =
        candidates().find(|&c| c >= 2 && chars[c - 1] == '\n' && chars[c - 2] == '\n');
    if double_newline.is_some() {
        return double_newline;
    }

    let newline = candidates().find(|&c| chars[c - 1] == '\n');
    if newline.is_some() {
        return newline;
    }

    candidates().find(|&c| SENTENCE_ENDINGS.contains(&chars[c - 1]))
}

/// 贪心合并相邻单元
fn merge_units(units: &[(usize, usize)], max: usize) -> Vec<(usize, usize)> {
    let mut merged: Vec<(usize, usize)> = Vec::new();

    for &(start, end) in units {
        match merged.last_mut() {
            Some(last) if end - last.0 <= max && last.1 == start => last.1 = end,
            _ => merged.push((start, end)),
        }
    }

    merged
}

fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    let start = text
        .char_indices()
        .nth(count - n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter(max: usize, overlap: usize, min: usize) -> TextSegmenter {
        TextSegmenter::new(SegmenterConfig {
            max_chunk_chars: max,
            overlap_chars: overlap,
            min_chunk_chars: min,
            tail_window_chars: 60,
        })
        .unwrap()
    }

    fn reconstruct(chunks: &[Chunk]) -> String {
        chunks.iter().map(|c| c.body()).collect()
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let s = TextSegmenter::new(SegmenterConfig::default()).unwrap();
        let text = "1. 下列哪个是哺乳动物？\nA. 鲨鱼 B. 海豚 C. 金枪鱼 D. 章鱼";
        let chunks = s.segment(text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
        assert_eq!(chunks[0].offset, 0);
        assert!(s.segment("").is_empty());
    }

    #[test]
    fn test_separator_split_prefers_blank_line() {
        let s = segmenter(120, 20, 40);
        let text = format!(
            "{}。\n\n{}下列说法正确的是 A. 选项一\n\n{}。",
            "甲".repeat(90),
            "乙".repeat(80),
            "丙".repeat(100)
        );

        let chunks = s.segment(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[1].offset, 93);
        assert_eq!(chunks[2].offset, 190);
        assert!(chunks[0].body().ends_with("。\n\n"));
        assert_eq!(reconstruct(&chunks), text);

        assert!(!chunks[0].looks_incomplete);
        assert!(chunks[1].looks_incomplete);

        // 第二块加了重叠，第三块正文够长且加重叠会超预算，所以不加
        assert_eq!(chunks[1].overlap_chars, 20);
        assert!(chunks[1].content.starts_with(&"甲".repeat(17)));
        assert_eq!(chunks[2].overlap_chars, 0);
    }

    #[test]
    fn test_hard_cut_without_separators() {
        let s = segmenter(50, 10, 1000);
        let text = "字".repeat(130);
        let chunks = s.segment(&text);
        let offsets: Vec<usize> = chunks.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 50, 100]);
        assert_eq!(reconstruct(&chunks), text);
        assert!(chunks[1..].iter().all(|c| c.overlap_chars == 10));
    }

    #[test]
    fn test_marker_split_keeps_questions_whole() {
        let s = segmenter(60, 0, 10);
        let q = |n: usize| format!("{}. {}？\n", n, "问".repeat(20));
        let text = format!("一、选择题\n{}{}{}{}", q(1), q(2), q(3), q(4));

        let markers = s.question_markers(&text);
        assert_eq!(markers.len(), 4);

        let chunks = s.segment(&text);
        assert_eq!(reconstruct(&chunks), text);
        // 每块正文都从题号（或文首）开始，题目不会被拦腰切断
        for chunk in &chunks {
            assert!(chunk.offset == 0 || markers.contains(&chunk.offset));
        }
        assert!(chunks.len() >= 2);
    }

    #[test]
    fn test_marker_variants() {
        let s = segmenter(100, 0, 10);
        let text = "（1）填空\n② 判断\n第3题 简答\nQuestion 4 essay\n5、选择\n3.14 不是题号";
        assert_eq!(s.question_markers(text).len(), 5);
    }

    #[test]
    fn test_looks_incomplete_signals() {
        let s = segmenter(100, 0, 10);
        assert!(s.looks_incomplete("下列正确的是 A. 甲 B. 乙 C."));
        assert!(s.looks_incomplete("如图（见附"));
        assert!(s.looks_incomplete("以下选项中，"));
        assert!(s.looks_incomplete("哪个是质数？ A. 4"));
        assert!(!s.looks_incomplete("哪个是质数？ A. 4 B. 5 C. 6 D. 8"));
        assert!(!s.looks_incomplete("光合作用的产物是（ 氧气 ）。"));
        assert!(!s.looks_incomplete("   "));
    }

    #[test]
    fn test_augment_with_lead_in() {
        let s = segmenter(120, 20, 40);
        let text = format!(
            "{}。\n\n{}下列说法正确的是 A. 选项一\n\n{}。",
            "甲".repeat(90),
            "乙".repeat(80),
            "丙".repeat(100)
        );
        let chunks = s.segment(&text);

        let augmented = augment_with_lead_in(&chunks, 1, 30);
        assert_eq!(
            augmented.chars().count(),
            chunks[1].content.chars().count() + 30
        );
        assert!(augmented.ends_with(&"丙".repeat(28)));

        // 完整的块和最后一块不追加
        assert_eq!(augment_with_lead_in(&chunks, 0, 30), chunks[0].content);
        assert_eq!(augment_with_lead_in(&chunks, 2, 30), chunks[2].content);
    }

    #[test]
    fn test_normalize_text() {
        let raw = "\u{feff}第一题\r\n\r\n\r\n\r\n答案：\u{3000}A   \r\n";
        assert_eq!(normalize_text(raw), "第一题\n\n答案： A");
    }
}
