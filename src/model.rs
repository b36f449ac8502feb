use serde::{Deserialize, Serialize};

/// Which specialized page shape produced a model. Generic models carry none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentKind {
    RegistrationEligibility,
    MinorProgram,
    NewsList,
    Schedule,
    Exam,
    MidtermScore,
    GradeReport,
    Transcript,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentModel {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ContentKind>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub blocks: Vec<Block>,
}

impl ContentModel {
    pub fn new(kind: Option<ContentKind>, title: impl Into<String>, blocks: Vec<Block>) -> Self {
        ContentModel {
            kind,
            title: title.into(),
            subtitle: None,
            blocks,
        }
    }

    pub fn with_subtitle(mut self, subtitle: Option<String>) -> Self {
        self.subtitle = subtitle;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoteTone {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValueItem {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkItem {
    pub label: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph { text: String },
    List { ordered: bool, items: Vec<String> },
    KeyValue { items: Vec<KeyValueItem> },
    Table { headers: Vec<String>, rows: Vec<Vec<String>> },
    Links { items: Vec<LinkItem> },
    Note { tone: NoteTone, text: String },
    Divider,
    MidtermScore(MidtermScoreBlock),
    NewsList(NewsListBlock),
    ScheduleTable(ScheduleTableBlock),
    ExamTable(ExamTableBlock),
    MinorProgram(MinorProgramBlock),
    RegistrationEligibility(RegistrationEligibilityBlock),
    GradeReport(GradeReportBlock),
    Transcript(TranscriptBlock),
}

impl Block {
    pub fn info(text: impl Into<String>) -> Self {
        Block::Note {
            tone: NoteTone::Info,
            text: text.into(),
        }
    }
}

// ── Scores ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScoreStatus {
    Score,
    Processing,
    NotAnnounced,
    NotEntered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreAssessment {
    pub label: String,
    pub status: ScoreStatus,
    pub display: String,
    /// Original cell text or icon file name.
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreCourse {
    pub order: String,
    pub course_number: String,
    pub course_title: String,
    pub section: String,
    pub assessments: Vec<ScoreAssessment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreLegendItem {
    pub status: ScoreStatus,
    pub label: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreboardHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faculty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_english_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_thai_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semester: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidtermScoreBlock {
    pub action_url: String,
    pub years: Vec<ScheduleOption>,
    pub semesters: Vec<ScheduleOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_semester: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<ScoreboardHeader>,
    pub assessments: Vec<String>,
    pub courses: Vec<ScoreCourse>,
    pub legend: Vec<ScoreLegendItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// ── News ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsListBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub items: Vec<NewsItem>,
}

// ── Selection forms ──

/// One `<option>` of a year/semester selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleOption {
    pub value: String,
    pub label: String,
}

impl ScheduleOption {
    pub fn same(value: impl Into<String>) -> Self {
        let value = value.into();
        ScheduleOption {
            label: value.clone(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTableBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub years: Vec<ScheduleOption>,
    pub semesters: Vec<ScheduleOption>,
    pub action_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamTableBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub years: Vec<ScheduleOption>,
    pub semesters: Vec<ScheduleOption>,
    pub action_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinorProgramBlock {
    pub source_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationEligibilityBlock {
    pub student_id: String,
    pub student_name: String,
    pub semester: String,
    pub has_eligibility: bool,
}

// ── Grade report / transcript ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReportCourse {
    pub no: String,
    pub course_no: String,
    pub course_title: String,
    pub section: String,
    pub credit: String,
    #[serde(rename = "type")]
    pub course_type: String,
    pub grade: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReportSummary {
    pub label: String,
    pub ca: String,
    pub cp: String,
    pub cd: String,
    pub gp: String,
    pub gps_gpa: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SymbolColor {
    Green,
    Red,
    Gray,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReportLegendItem {
    pub symbol: String,
    pub symbol_color: SymbolColor,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReportBlock {
    pub action_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    pub years: Vec<ScheduleOption>,
    pub semesters: Vec<ScheduleOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_semester: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<ScoreboardHeader>,
    pub courses: Vec<GradeReportCourse>,
    pub summaries: Vec<GradeReportSummary>,
    pub legend: Vec<GradeReportLegendItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptBlock {
    pub action_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}
