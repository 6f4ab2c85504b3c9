/// LLM 提示词
///
/// 抽取（文本 / 图片）和主观题评分三类调用使用的系统提示词与用户消息模板
use crate::models::exam::AnswerValue;

/// 文本抽取的系统提示词
pub const TEXT_EXTRACTION_SYSTEM: &str = "你是一个专业的试卷结构化助手，擅长从试卷文本中识别每一道题目，并输出规范的 JSON。你只输出 JSON，不输出任何解释。";

/// 图片抽取的系统提示词
pub const VISION_EXTRACTION_SYSTEM: &str = r#"你是一个专业的试卷识别助手，负责识别试卷图片中的全部题目。

输出格式：
{"questions": [{"content": "题干", "type": "单选题|多选题|判断题|填空题|简答题", "options": ["A. ...", "B. ..."], "answer": "标准答案", "explanation": "解析", "tags": ["知识点标签"], "difficulty": "easy|medium|hard", "knowledgePoint": "知识点"}]}

【要求】
- 题干保持原文，不要改写
- 没有选项的题目省略 options
- 看不清或没有的字段省略，不要编造
- 如果这一页是封面、空白页或没有任何题目，直接回复 "no questions detected"
- 只输出 JSON"#;

/// 主观题评分的系统提示词
pub const GRADING_SYSTEM: &str = "你是一位严谨、公正的阅卷老师，根据参考答案给学生的作答打分。你只输出 JSON，不输出任何解释。";

/// 构建文本抽取的用户消息
///
/// # 参数
/// - `chunk`: 本次发送的文本（可能已附带下一块的开头）
/// - `index` / `total`: 当前是第几块（从 1 开始）、共几块
pub fn build_text_prompt(chunk: &str, index: usize, total: usize) -> String {
    format!(
        r#"下面是一份试卷文本的第 {} / {} 部分。请识别其中的全部题目。

【重要说明】
- 文本按长度切分，开头可能是上一部分的结尾，结尾可能附带下一部分的开头
- 只输出在本部分中题干完整的题目；被截断、无法判断完整内容的题目跳过
- 题型只能是：单选题、多选题、判断题、填空题、简答题
- 看不清或没有的字段省略，不要编造
- 如果本部分没有任何题目，直接回复 "no questions detected"

输出格式：
{{"questions": [{{"content": "题干", "type": "题型", "options": ["A. ...", "B. ..."], "answer": "标准答案", "explanation": "解析", "tags": ["标签"], "difficulty": "easy|medium|hard", "knowledgePoint": "知识点"}}]}}

试卷文本：
{}"#,
        index, total, chunk
    )
}

/// 构建主观题评分的用户消息
pub fn build_grading_prompt(
    question: &str,
    reference: &AnswerValue,
    answer: &AnswerValue,
    max_score: f64,
) -> String {
    format!(
        r#"请给下面这道题的学生作答打分。

题目：{}
参考答案：{}
学生作答：{}
满分：{}

【评分要求】
- 分数在 0 到 {} 之间，可以给部分分
- 与参考答案意思一致即可，不要求逐字相同
- confidence 表示你对这个分数的把握（0 到 1）；作答含糊、参考答案开放时要降低 confidence

只返回如下 JSON：
{{"score": 分数, "reasoning": "评分理由", "suggestions": ["改进建议"], "confidence": 0.0}}"#,
        question,
        reference.to_display(),
        answer.to_display(),
        max_score,
        max_score
    )
}
