use tabled::{Table, Tabled};

use crate::models::*;

#[derive(Tabled)]
struct SessionRow {
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Question")]
    question: String,
    #[tabled(rename = "Connected")]
    connected: String,
}

impl From<&Session> for SessionRow {
    fn from(s: &Session) -> Self {
        Self {
            label: s.label.clone(),
            id: s.id.clone(),
            status: s.status.clone(),
            question: s
                .question_title
                .as_deref()
                .map(|t| truncate(t, 40))
                .unwrap_or_else(|| "-".to_string()),
            connected: format_time(&s.connected_at),
        }
    }
}

pub fn format_sessions(sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return "No sessions connected.\n".to_string();
    }
    let rows: Vec<SessionRow> = sessions.iter().map(SessionRow::from).collect();
    Table::new(rows).to_string()
}

#[derive(Tabled)]
struct QuestionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Session")]
    session: String,
    #[tabled(rename = "Asked")]
    asked: String,
    #[tabled(rename = "Timeout")]
    timeout: String,
}

impl From<&Question> for QuestionRow {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            title: truncate(&q.title, 40),
            status: q.status.clone(),
            session: q.session_id.clone(),
            asked: format_time(&q.created_at),
            timeout: format!("{}m", q.timeout_minutes),
        }
    }
}

pub fn format_questions(questions: &[Question]) -> String {
    if questions.is_empty() {
        return "No questions found.\n".to_string();
    }
    let rows: Vec<QuestionRow> = questions.iter().map(QuestionRow::from).collect();
    Table::new(rows).to_string()
}

pub fn format_question(question: &Question) -> String {
    let mut output = String::new();
    output.push_str(&format!("Question: {}\n", question.title));
    output.push_str(&format!("  ID:      {}\n", question.id));
    output.push_str(&format!("  Session: {}\n", question.session_id));
    output.push_str(&format!("  Status:  {}\n", question.status));
    output.push_str(&format!("  Asked:   {}\n", question.created_at));
    output.push_str(&format!("  Timeout: {} minutes\n", question.timeout_minutes));
    if let Some(context) = &question.context {
        output.push_str(&format!("  Context: {}\n", context));
    }
    if let Some(answer) = &question.answer {
        output.push_str(&format!("  Answer:  {}\n", answer));
    }
    if let Some(answered_at) = &question.answered_at {
        output.push_str(&format!("  Answered: {}\n", answered_at));
    }
    output.push_str(&format!("\n{}\n", question.body));
    output
}

// Helper functions
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() > max_len {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}

fn format_time(iso_date: &str) -> String {
    // Date and minutes are plenty for tables
    if iso_date.len() >= 16 && iso_date.is_char_boundary(16) {
        iso_date[..16].replace('T', " ")
    } else {
        iso_date.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question() -> Question {
        Question {
            id: "q-a3f8k2m1".to_string(),
            session_id: "sess-20260821-7f2c".to_string(),
            title: "Pick a port".to_string(),
            body: "Which port should the service bind?".to_string(),
            context: None,
            thread_id: None,
            answer: None,
            answered_at: None,
            created_at: "2026-08-21T10:00:00+00:00".to_string(),
            timeout_minutes: 60,
            status: "pending".to_string(),
        }
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
        // Multi-byte characters must not be split
        let s = "éééééééééé";
        let out = truncate(s, 8);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), 8);
    }

    #[test]
    fn test_format_time_trims_to_minutes() {
        assert_eq!(
            format_time("2026-08-21T10:00:00+00:00"),
            "2026-08-21 10:00"
        );
        assert_eq!(format_time("bogus"), "bogus");
    }

    #[test]
    fn test_format_questions_empty() {
        assert_eq!(format_questions(&[]), "No questions found.\n");
    }

    #[test]
    fn test_format_question_includes_answer() {
        let mut q = question();
        q.status = "answered".to_string();
        q.answer = Some("8080".to_string());
        let out = format_question(&q);
        assert!(out.contains("Answer:  8080"));
        assert!(out.contains("Which port should the service bind?"));
    }

    #[test]
    fn test_format_sessions_table_has_labels() {
        let session = Session {
            id: "sess-20260821-7f2c".to_string(),
            label: "proj/1".to_string(),
            project: "proj".to_string(),
            status: "waiting".to_string(),
            question_title: Some("Pick a port".to_string()),
            connected_at: "2026-08-21T10:00:00+00:00".to_string(),
        };
        let out = format_sessions(&[session]);
        assert!(out.contains("proj/1"));
        assert!(out.contains("Pick a port"));
    }
}
