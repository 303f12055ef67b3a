//! HTML document template for a translated quiz.

use std::fmt::Write as _;

use html_escape::encode_text;

use quizrelay_shared::{EnrichedRecord, QuizQuestion};

const STYLE: &str = r#"
@import url('https://fonts.googleapis.com/css2?family=Noto+Sans+Gujarati:wght@400;600;700&display=swap');
@page { size: A4; margin: 14mm 12mm; }
* { box-sizing: border-box; }
body { font-family: 'Noto Sans Gujarati', sans-serif; color: #1f2937; margin: 0; line-height: 1.5; }
.cover { text-align: center; padding: 48px 0 32px; border-bottom: 3px solid #4f46e5; margin-bottom: 24px; }
.cover h1 { font-size: 30px; margin: 0 0 8px; color: #312e81; }
.cover .date { font-size: 20px; color: #4b5563; }
.cover .meta { font-size: 14px; color: #6b7280; margin-top: 8px; }
.question { border: 1px solid #e5e7eb; border-radius: 10px; padding: 16px 18px; margin-bottom: 16px; page-break-inside: avoid; }
.question h3 { font-size: 17px; margin: 0 0 12px; display: flex; gap: 10px; }
.badge { background: #4f46e5; color: #fff; border-radius: 50%; min-width: 28px; height: 28px; display: inline-flex; align-items: center; justify-content: center; font-size: 14px; }
.option { padding: 6px 12px; border-radius: 8px; margin: 4px 0; background: #f9fafb; }
.option.correct { background: #dcfce7; border: 1px solid #16a34a; font-weight: 600; }
.label { font-weight: 700; margin-right: 8px; }
.explanation { margin-top: 12px; padding: 10px 12px; background: #eef2ff; border-left: 4px solid #6366f1; font-size: 14px; }
.footer { text-align: center; font-size: 13px; color: #6b7280; margin-top: 24px; }
"#;

/// Render `record` as a standalone HTML page.
pub fn render_html(record: &EnrichedRecord, title: &str, footer: &[String]) -> String {
    let quiz = &record.quiz;
    let mut html = String::with_capacity(4096 + quiz.questions.len() * 1024);

    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"{lang}\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title} - {date}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n",
        lang = encode_text(&record.language),
        title = encode_text(title),
        date = encode_text(&quiz.date.english),
    );

    let _ = write!(
        html,
        "<section class=\"cover\">\n<h1>{title}</h1>\n<div class=\"date\">{date}</div>\n<div class=\"meta\">{count} પ્રશ્નો</div>\n</section>\n",
        title = encode_text(title),
        date = encode_text(&quiz.date.localized),
        count = quiz.questions.len(),
    );

    for question in &quiz.questions {
        write_question(&mut html, question);
    }

    if !footer.is_empty() {
        html.push_str("<div class=\"footer\">");
        let lines: Vec<String> = footer.iter().map(|l| encode_text(l).into_owned()).collect();
        html.push_str(&lines.join("<br>"));
        html.push_str("</div>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn write_question(html: &mut String, question: &QuizQuestion) {
    let _ = write!(
        html,
        "<div class=\"question\">\n<h3><span class=\"badge\">{}</span><span>{}</span></h3>\n",
        question.number,
        encode_text(&question.text),
    );

    for option in &question.options {
        let correct = option.label == question.answer;
        let _ = write!(
            html,
            "<div class=\"option{}\"><span class=\"label\">{}</span>{}{}</div>\n",
            if correct { " correct" } else { "" },
            option.label,
            encode_text(&option.text),
            if correct { " ✓" } else { "" },
        );
    }

    if !question.explanation.is_empty() {
        let _ = write!(
            html,
            "<div class=\"explanation\"><strong>સમજૂતી:</strong> {}</div>\n",
            encode_text(&question.explanation),
        );
    }
    html.push_str("</div>\n");
}
