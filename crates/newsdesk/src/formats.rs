//! Text renderings: the candidate board, the automatic digest and the
//! three curated publication formats (A social, B APA 7, C design).

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm::LlmClient;
use crate::models::{display_date, parse_timestamp, Article, Candidate};

const BOARD_TITLE_CHARS: usize = 70;
const BOARD_KEY_POINT_CHARS: usize = 30;
const MIN_BOARD_CANDIDATES: usize = 12;
const DIGEST_SUMMARY_CHARS: usize = 160;
const SOCIAL_KEY_POINT_CHARS: usize = 20;
const SOCIAL_SUMMARY_CHARS: usize = 150;
const DESIGN_KEY_POINT_CHARS: usize = 15;

/// The three publication formats of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formats {
    pub format_a: String,
    pub format_b: String,
    pub format_c: String,
}

pub struct FormatGenerator;

impl FormatGenerator {
    /// Markdown board the editor reads before issuing commands
    pub fn candidate_board(candidates: &[Candidate], date: &str) -> String {
        let mut md = String::new();
        md.push_str("# 候選看板\n");
        md.push_str(&format!("日期: {}\n\n", date));

        let headers = [
            "#", "類別", "標題", "一句重點", "關鍵數據", "技術", "影響", "實戰", "時效", "總分",
            "時效", "來源", "URL", "ClusterID",
        ];
        md.push_str(&format!("| {} |\n", headers.join(" | ")));
        md.push_str(&format!("|{}|\n", vec!["---"; headers.len()].join("|")));

        for c in candidates {
            let row = [
                c.id.to_string(),
                escape_cell(&c.category),
                escape_cell(&truncate(&c.title, BOARD_TITLE_CHARS)),
                escape_cell(&truncate(&c.key_point, BOARD_KEY_POINT_CHARS)),
                escape_cell(&c.key_data),
                c.tech_score.to_string(),
                c.impact_score.to_string(),
                c.practical_score.to_string(),
                c.timely_score.to_string(),
                format!("{:.1}", c.total_score),
                escape_cell(&c.hours_ago),
                escape_cell(&c.source),
                c.url.clone(),
                escape_cell(&c.cluster_id),
            ];
            md.push_str(&format!("| {} |\n", row.join(" | ")));
        }

        md.push_str("\n## 去重說明\n");
        let mut clusters: Vec<(&str, Vec<String>)> = Vec::new();
        for c in candidates {
            let member = format!("{}: {}", c.id, c.source);
            match clusters.iter().position(|(id, _)| *id == c.cluster_id) {
                Some(pos) => clusters[pos].1.push(member),
                None => clusters.push((c.cluster_id.as_str(), vec![member])),
            }
        }
        for (cluster_id, members) in clusters.iter().filter(|(_, m)| m.len() > 1) {
            md.push_str(&format!("- **{}**: {}\n", cluster_id, members.join(", ")));
        }

        if candidates.len() < MIN_BOARD_CANDIDATES {
            md.push_str("\n## 缺料建議\n");
            md.push_str("建議擴充以下關鍵詞或來源：\n");
            md.push_str("- 模型發布：OpenAI、Anthropic、Google、Meta 官方\n");
            md.push_str("- 開發工具：GitHub、Cursor、VS Code\n");
            md.push_str("- 企業應用：Microsoft、Google Cloud、AWS\n");
            md.push_str("- 研究：Nature、Science、arXiv\n");
        }

        md
    }

    /// The unattended Top-N digest written by `collect-news --auto`
    pub fn digest(top: &[Article]) -> Formats {
        let mut social = vec![format!("# 🔥 今日精選 AI 新聞（Top {}）", top.len())];
        let mut apa = vec![format!("# 📚 APA 近似引用彙整（Top {}）", top.len())];
        let mut design = Vec::new();

        for (i, a) in top.iter().enumerate() {
            let date = display_date(&a.published_at);
            let summary: String = a.summary.chars().take(DIGEST_SUMMARY_CHARS).collect();
            social.push(format!(
                "- **{}. {}**  \n  {}...  \n  {}｜{}｜[連結]({}) #AI #Tech",
                i + 1,
                a.title,
                summary,
                date,
                a.source,
                a.url
            ));

            let publisher = if a.source.is_empty() {
                "未知機構"
            } else {
                a.source.as_str()
            };
            let year: String = date.chars().take(4).collect();
            apa.push(format!("- {}（{}）。{}。取自 {}", publisher, year, a.title, a.url));

            design.push(format!(
                "{}｜AI, Tech｜{}｜{}｜{}",
                a.title, a.source, date, a.url
            ));
        }

        Formats {
            format_a: social.join("\n"),
            format_b: apa.join("\n"),
            format_c: design.join("\n"),
        }
    }

    /// Format A, social post, rendered without a model
    pub fn social(selected: &[Candidate], date: &str) -> String {
        let mut out = String::new();
        out.push_str(&format!("【格式A：社群傳播版】{}\n\n", date));

        for c in selected {
            out.push_str(&format!("🏷️【{}】{}\n\n", c.category, c.title));
            out.push_str(&format!(
                "💡{}\n\n",
                truncate_plain(&c.key_point, SOCIAL_KEY_POINT_CHARS)
            ));
            if !c.summary.is_empty() {
                out.push_str(&format!(
                    "摘要：{}\n\n",
                    truncate(&c.summary, SOCIAL_SUMMARY_CHARS)
                ));
            }
            out.push_str("關鍵洞察：\n");
            out.push_str(&format!("技術突破：技術分 {}/5\n", c.tech_score));
            out.push_str(&format!("實務影響：影響分 {}/5，實戰分 {}/5\n", c.impact_score, c.practical_score));
            let action = match (&c.evidence, c.key_data.as_str()) {
                (Some(evidence), _) => truncate(evidence, SOCIAL_SUMMARY_CHARS),
                (None, "—") | (None, "") => "閱讀原文並評估導入可行性".to_string(),
                (None, data) => data.to_string(),
            };
            out.push_str(&format!("行動建議：{}\n\n", action));
            out.push_str("創新實踐者反思：\n");
            out.push_str(&format!("→ 跨界連結：{}\n", c.source));
            out.push_str(&format!("→ 實踐路徑：{}\n", c.url));
            out.push_str(&format!("→ 核心啟發：{}\n\n", c.key_point));
            out.push_str("---\n\n");
        }

        out.push_str("📊 最後總結\n");
        let trends: Vec<String> = top_categories(selected, 3)
            .into_iter()
            .map(|(category, count)| format!("{}（{} 則）", category, count))
            .collect();
        out.push_str(&format!("【今日三大趨勢】：{}\n", trends.join("、")));
        if let Some(best) = selected.iter().max_by(|a, b| {
            a.total_score
                .partial_cmp(&b.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.id.cmp(&a.id))
        }) {
            let quote = if best.key_point.is_empty() {
                &best.title
            } else {
                &best.key_point
            };
            out.push_str(&format!("【金句洞察】：{}\n", quote));
        }
        out.push_str(&format!(
            "【立即行動】：產品團隊本週內挑選 {} 則新聞試行，兩週內回報成效\n",
            selected.len()
        ));

        out
    }

    /// Format B, APA 7 references
    pub fn apa(selected: &[Candidate]) -> String {
        selected
            .iter()
            .map(|c| {
                let date = match parse_timestamp(&c.published_at) {
                    Some(dt) => format!("{}, {} {:02}", dt.year(), dt.format("%B"), dt.day()),
                    None => "n.d.".to_string(),
                };
                format!("{}. ({}). {}. {}. {}", c.source, date, c.title, c.source, c.url)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Format C, two lines per item for the design team
    pub fn design(selected: &[Candidate]) -> String {
        selected
            .iter()
            .map(|c| {
                let point = if c.key_point.is_empty() {
                    &c.title
                } else {
                    &c.key_point
                };
                format!(
                    "[{}]\n[{}]",
                    c.category,
                    truncate_plain(point, DESIGN_KEY_POINT_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn templates(selected: &[Candidate], date: &str) -> Formats {
        Formats {
            format_a: Self::social(selected, date),
            format_b: Self::apa(selected),
            format_c: Self::design(selected),
        }
    }

    /// Ask the model for each format, falling back to the template per format
    pub async fn generate(llm: Option<&dyn LlmClient>, selected: &[Candidate], date: &str) -> Formats {
        let templates = Self::templates(selected, date);
        let Some(llm) = llm else {
            return templates;
        };

        let items = serde_json::to_string_pretty(selected).unwrap_or_default();
        let social = social_prompt(&items, date);
        let apa = apa_prompt(&items, selected.len());
        let design = design_prompt(&items, selected.len());
        let (a, b, c) = tokio::join!(
            llm.generate(&social, 0.3),
            llm.generate(&apa, 0.1),
            llm.generate(&design, 0.2),
        );

        let pick = |name: &str, result: anyhow::Result<String>, fallback: String| match result {
            Ok(text) => text,
            Err(e) => {
                warn!(format = name, "generation failed, using template: {:#}", e);
                fallback
            }
        };

        Formats {
            format_a: pick("A", a, templates.format_a),
            format_b: pick("B", b, templates.format_b),
            format_c: pick("C", c, templates.format_c),
        }
    }

    /// All three formats in one markdown document
    pub fn full_result(formats: &Formats, date: &str) -> String {
        format!(
            "# AI 新聞自動化結果\n日期: {}\n\n## 格式 A: 社群傳播版\n{}\n\n---\n\n## 格式 B: APA 7 引用格式\n{}\n\n---\n\n## 格式 C: 視覺設計版\n{}\n",
            date, formats.format_a, formats.format_b, formats.format_c
        )
    }
}

fn social_prompt(items: &str, date: &str) -> String {
    format!(
        r#"你是一位專業的 AI 產業內容策展人與創新實踐者。

請以 繁體中文、時區 Asia/Taipei，依 [今天日期：{date}] 為以下選中的新聞生成【格式A：社群傳播版】：

{items}

請按照以下結構輸出：

【格式A：社群傳播版】

🏷️【分類】新聞標題

💡一句話重點（≤20 字）

摘要（120–150 字）：核心事實 + 2–3 關鍵訊息 + 影響範圍

關鍵洞察：
技術突破：X
實務影響：X
行動建議：X

創新實踐者反思：
→ 跨界連結：X
→ 實踐路徑：X
→ 核心啟發：X

---

📊 最後總結
【今日三大趨勢】：列 3 點（每點 ≤20 字）
【金句洞察】：1 句
【立即行動】：角色＋時間＋具體行動＋量化效果

格式要求：
- 使用 emoji 突出分類與亮點
- 語氣專業、簡潔，偏向產業觀點
- 不要贅述背景故事，聚焦「新 → 有數據 → 有行動」
- 每篇新聞都要有完整的結構"#
    )
}

fn apa_prompt(items: &str, count: usize) -> String {
    format!(
        "請為以下新聞生成【格式B：APA 7 引用格式】：\n\n{items}\n\n請輸出 {count} 條 APA 7 格式的引用，格式如下：\nAuthor. (Year, Month Day). Title. Publisher/Source. URL\n\n每條都必須包含 URL。"
    )
}

fn design_prompt(items: &str, count: usize) -> String {
    format!(
        "請為以下新聞生成【格式C：視覺設計版】：\n\n{items}\n\n每則兩行：\n第 1 行：[類別]\n第 2 行：[精煉重點 10–15 字]\n\n請輸出 {count} 則，每則用換行分隔。"
    )
}

/// (category, key point) rows from a Format C text; blank lines are ignored
pub fn parse_design_rows(format_c: &str) -> Vec<(String, String)> {
    let lines: Vec<&str> = format_c
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines
        .chunks(2)
        .filter(|pair| pair.len() == 2)
        .map(|pair| (strip_brackets(pair[0]), strip_brackets(pair[1])))
        .collect()
}

fn strip_brackets(line: &str) -> String {
    line.trim_start_matches(['[', '【'])
        .trim_end_matches([']', '】'])
        .trim()
        .to_string()
}

/// Most frequent categories, ties in first-seen order
fn top_categories(selected: &[Candidate], n: usize) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for c in selected {
        match counts.iter().position(|(cat, _)| *cat == c.category) {
            Some(pos) => counts[pos].1 += 1,
            None => counts.push((c.category.clone(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(n);
    counts
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

fn truncate_plain(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::normalize_article;
    use async_trait::async_trait;

    fn candidate(id: usize, category: &str, cluster: &str) -> Candidate {
        Candidate {
            id,
            article_id: format!("a{id}"),
            title: format!("Story number {id}"),
            summary: "Summary text".into(),
            source: format!("Source{id}"),
            url: format!("https://example.com/{id}"),
            published_at: "2026-02-03T10:00:00+00:00".into(),
            category: category.into(),
            key_point: format!("重點{id}"),
            key_data: "—".into(),
            tech_score: 4,
            impact_score: 3,
            practical_score: 2,
            timely_score: 5,
            total_score: 3.5,
            hours_ago: "12".into(),
            cluster_id: cluster.into(),
            evidence: None,
            merged_urls: Vec::new(),
        }
    }

    #[test]
    fn test_candidate_board_table_and_sections() {
        let mut long = candidate(1, "研究突破", "c1");
        long.title = "x".repeat(80);
        long.key_point = "k|ey".into();
        let board = FormatGenerator::candidate_board(
            &[long, candidate(2, "企業應用", "c1"), candidate(3, "企業應用", "c3")],
            "2026-02-05",
        );

        assert!(board.starts_with("# 候選看板\n日期: 2026-02-05\n"));
        assert!(board.contains(
            "| # | 類別 | 標題 | 一句重點 | 關鍵數據 | 技術 | 影響 | 實戰 | 時效 | 總分 | 時效 | 來源 | URL | ClusterID |"
        ));
        assert!(board.contains("|---|---|---|---|---|---|---|---|---|---|---|---|---|---|"));
        assert!(board.contains(&format!("{}...", "x".repeat(70))));
        assert!(board.contains("k\\|ey"));
        assert!(board.contains("| 3.5 |"));
        assert!(board.contains("- **c1**: 1: Source1, 2: Source2"));
        assert!(!board.contains("- **c3**"));
        assert!(board.contains("## 缺料建議"));
    }

    #[test]
    fn test_candidate_board_without_shortage_section() {
        let many: Vec<_> = (1..=12)
            .map(|i| candidate(i, "研究突破", &format!("c{i}")))
            .collect();
        let board = FormatGenerator::candidate_board(&many, "2026-02-05");
        assert!(!board.contains("缺料建議"));
    }

    #[test]
    fn test_digest_formats() {
        let article = normalize_article(
            Some("Model launch"),
            Some("https://example.com/m"),
            Some("2026-02-03T10:00:00Z"),
            "OpenAI",
            Some(&"s".repeat(200)),
        );
        let formats = FormatGenerator::digest(&[article]);

        assert!(formats.format_a.starts_with("# 🔥 今日精選 AI 新聞（Top 1）"));
        assert!(formats.format_a.contains(&format!(
            "- **1. Model launch**  \n  {}...  \n  2026-02-03｜OpenAI｜[連結](https://example.com/m) #AI #Tech",
            "s".repeat(160)
        )));
        assert!(formats
            .format_b
            .contains("- OpenAI（2026）。Model launch。取自 https://example.com/m"));
        assert_eq!(
            formats.format_c,
            "Model launch｜AI, Tech｜OpenAI｜2026-02-03｜https://example.com/m"
        );
    }

    #[test]
    fn test_apa_reference() {
        let apa = FormatGenerator::apa(&[candidate(1, "研究突破", "c1")]);
        assert_eq!(
            apa,
            "Source1. (2026, February 03). Story number 1. Source1. https://example.com/1"
        );
    }

    #[test]
    fn test_apa_without_date() {
        let mut c = candidate(1, "研究突破", "c1");
        c.published_at = "unknown".into();
        assert!(FormatGenerator::apa(&[c]).contains("(n.d.)"));
    }

    #[test]
    fn test_social_trends_use_most_frequent_categories() {
        let selected = vec![
            candidate(1, "研究突破", "c1"),
            candidate(2, "企業應用", "c2"),
            candidate(3, "企業應用", "c3"),
            candidate(4, "模型發布", "c4"),
            candidate(5, "重大融資", "c5"),
        ];
        let social = FormatGenerator::social(&selected, "2026-02-05");
        assert!(social.contains("🏷️【研究突破】Story number 1"));
        assert!(social.contains("【今日三大趨勢】：企業應用（2 則）、研究突破（1 則）、模型發布（1 則）"));
        assert!(social.contains("【金句洞察】：重點1"));
        assert!(social.contains("行動建議：閱讀原文並評估導入可行性"));
    }

    #[test]
    fn test_design_and_parse_rows() {
        let mut long = candidate(2, "企業應用", "c2");
        long.key_point = "一二三四五六七八九十一二三四五六七".into();
        let design = FormatGenerator::design(&[candidate(1, "研究突破", "c1"), long]);
        assert_eq!(
            design,
            "[研究突破]\n[重點1]\n\n[企業應用]\n[一二三四五六七八九十一二三四五]"
        );
        assert_eq!(
            parse_design_rows(&design),
            vec![
                ("研究突破".to_string(), "重點1".to_string()),
                ("企業應用".to_string(), "一二三四五六七八九十一二三四五".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_design_rows_drops_dangling_line() {
        assert_eq!(
            parse_design_rows("【模型發布】\n新模型上線\n\n[孤兒]"),
            vec![("模型發布".to_string(), "新模型上線".to_string())]
        );
    }

    #[test]
    fn test_full_result_layout() {
        let formats = Formats {
            format_a: "A".into(),
            format_b: "B".into(),
            format_c: "C".into(),
        };
        let full = FormatGenerator::full_result(&formats, "2026-02-05");
        assert!(full.starts_with("# AI 新聞自動化結果\n日期: 2026-02-05\n"));
        assert!(full.contains("## 格式 A: 社群傳播版\nA\n\n---"));
        assert!(full.ends_with("## 格式 C: 視覺設計版\nC\n"));
    }

    struct FailsOnApa;

    #[async_trait]
    impl LlmClient for FailsOnApa {
        async fn generate(&self, prompt: &str, _temperature: f32) -> anyhow::Result<String> {
            if prompt.contains("格式B") {
                anyhow::bail!("quota exceeded")
            }
            Ok(format!("LLM:{}", prompt.chars().take(5).collect::<String>()))
        }
    }

    #[tokio::test]
    async fn test_generate_falls_back_per_format() {
        let selected = vec![candidate(1, "研究突破", "c1")];
        let formats = FormatGenerator::generate(Some(&FailsOnApa), &selected, "2026-02-05").await;
        assert!(formats.format_a.starts_with("LLM:"));
        assert_eq!(formats.format_b, FormatGenerator::apa(&selected));
        assert!(formats.format_c.starts_with("LLM:"));
    }

    #[tokio::test]
    async fn test_generate_without_model_uses_templates() {
        let selected = vec![candidate(1, "研究突破", "c1")];
        let formats = FormatGenerator::generate(None, &selected, "2026-02-05").await;
        assert_eq!(formats, FormatGenerator::templates(&selected, "2026-02-05"));
    }
}
