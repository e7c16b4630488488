use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    Planning,
    Applied,
    Interviewing,
    Offer,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Planning => "Planning",
            ApplicationStatus::Applied => "Applied",
            ApplicationStatus::Interviewing => "Interviewing",
            ApplicationStatus::Offer => "Offer",
            ApplicationStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Category {
    #[default]
    Tech,
    Product,
    Design,
    Ops,
    Data,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Tech,
        Category::Product,
        Category::Design,
        Category::Ops,
        Category::Data,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Tech => "Tech",
            Category::Product => "Product",
            Category::Design => "Design",
            Category::Ops => "Ops",
            Category::Data => "Data",
            Category::Other => "Other",
        }
    }

    pub fn label(self, lang: Lang) -> &'static str {
        match (lang, self) {
            (Lang::En, c) => c.as_str(),
            (Lang::Zh, Category::Tech) => "技术",
            (Lang::Zh, Category::Product) => "产品",
            (Lang::Zh, Category::Design) => "设计",
            (Lang::Zh, Category::Ops) => "运营",
            (Lang::Zh, Category::Data) => "数据",
            (Lang::Zh, Category::Other) => "其他",
        }
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                anyhow!(
                    "Unknown category '{}'. Available: tech, product, design, ops, data, other",
                    s
                )
            })
    }
}

/// Category selector for list views. `All` only exists here; a stored
/// application always carries a concrete [`Category`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(c) => c == category,
        }
    }

    pub fn label(self, lang: Lang) -> &'static str {
        match (self, lang) {
            (CategoryFilter::All, Lang::Zh) => "全部岗位",
            (CategoryFilter::All, Lang::En) => "All Categories",
            (CategoryFilter::Only(c), lang) => c.label(lang),
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(CategoryFilter::All)
        } else {
            s.parse().map(CategoryFilter::Only)
        }
    }
}

/// Milestones an application moves through, persisted as its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Stage {
    #[default]
    Applied,
    Screening,
    Round1,
    Round2,
    Final,
    Offer,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Applied,
        Stage::Screening,
        Stage::Round1,
        Stage::Round2,
        Stage::Final,
        Stage::Offer,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Stage> {
        Stage::ALL.get(index).copied()
    }

    /// Status implied by the stage alone, ignoring any rejection.
    pub fn status(self) -> ApplicationStatus {
        match self {
            Stage::Applied => ApplicationStatus::Applied,
            Stage::Screening | Stage::Round1 | Stage::Round2 | Stage::Final => {
                ApplicationStatus::Interviewing
            }
            Stage::Offer => ApplicationStatus::Offer,
        }
    }

    pub fn is_interviewing(self) -> bool {
        matches!(self, Stage::Screening | Stage::Round1 | Stage::Round2 | Stage::Final)
    }

    pub fn label(self, lang: Lang) -> &'static str {
        lang.milestones()[self.index()]
    }
}

impl TryFrom<u8> for Stage {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        Stage::from_index(value as usize)
            .ok_or_else(|| format!("stage index {} out of range 0-5", value))
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> u8 {
        stage as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    #[default]
    Zh,
    En,
}

impl Lang {
    pub fn as_str(self) -> &'static str {
        match self {
            Lang::Zh => "zh",
            Lang::En => "en",
        }
    }

    pub fn milestones(self) -> [&'static str; 6] {
        match self {
            Lang::Zh => ["投递", "初筛", "一面", "二面", "终面", "Offer"],
            Lang::En => ["Applied", "Screening", "Round 1", "Round 2", "Final", "Offer"],
        }
    }

    pub fn toggled(self) -> Lang {
        match self {
            Lang::Zh => Lang::En,
            Lang::En => Lang::Zh,
        }
    }
}

impl FromStr for Lang {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "zh" | "cn" | "chinese" => Ok(Lang::Zh),
            "en" | "english" => Ok(Lang::En),
            _ => Err(anyhow!("Unknown language '{}'. Available: zh, en", s)),
        }
    }
}

/// What un-marking a rejection restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnrejectPolicy {
    /// Always land on Interviewing, whatever the status was before.
    #[default]
    Interviewing,
    /// Restore the status recorded when the rejection was set.
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Apple,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Apple => "apple",
        }
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "google" => Ok(Provider::Google),
            "apple" => Ok(Provider::Apple),
            _ => Err(anyhow!("Unknown provider '{}'. Available: google, apple", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String, // stored, never displayed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSource {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiReport {
    pub summary: String,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub suitability_assessment: String,
    #[serde(default)]
    pub interview_tips: Vec<String>,
    #[serde(default)]
    pub potential_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<ReportSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interview {
    pub id: String,
    pub round: String, // free text, e.g. "Round 1 Interview"
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default)]
    pub interviewer_info: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_link: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub reflections: String,
    #[serde(default)]
    pub experience_rating: u8,
    #[serde(default)]
    pub is_completed: bool,
}

/// Field-by-field update for an [`Interview`]; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterviewPatch {
    pub round: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub interviewer_info: Option<String>,
    pub meeting_link: Option<String>,
    pub notes: Option<String>,
    pub reflections: Option<String>,
    pub experience_rating: Option<u8>,
    pub is_completed: Option<bool>,
}

impl InterviewPatch {
    pub fn is_empty(&self) -> bool {
        *self == InterviewPatch::default()
    }

    pub fn apply(self, interview: &mut Interview) {
        if let Some(round) = self.round {
            interview.round = round;
        }
        if let Some(date) = self.date {
            interview.date = date;
        }
        if let Some(time) = self.time {
            interview.time = (!time.is_empty()).then_some(time);
        }
        if let Some(info) = self.interviewer_info {
            interview.interviewer_info = info;
        }
        if let Some(link) = self.meeting_link {
            interview.meeting_link = (!link.is_empty()).then_some(link);
        }
        if let Some(notes) = self.notes {
            interview.notes = notes;
        }
        if let Some(reflections) = self.reflections {
            interview.reflections = reflections;
        }
        if let Some(rating) = self.experience_rating {
            interview.experience_rating = rating;
        }
        if let Some(done) = self.is_completed {
            interview.is_completed = done;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobApplication {
    pub id: String,
    pub company_name: String,
    pub position_title: String,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>, // "linkedin", "referral", ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jd_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jd_text: Option<String>,
    pub status: ApplicationStatus,
    pub applied_date: String,
    #[serde(default)]
    pub interviews: Vec<Interview>,
    #[serde(rename = "currentStageIndex")]
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_suggestions: Option<AiReport>,
    #[serde(default)]
    pub my_reflections: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_before_rejection: Option<ApplicationStatus>,
}

impl JobApplication {
    pub fn is_rejected(&self) -> bool {
        self.status == ApplicationStatus::Rejected
    }

    /// Moves to `stage`. A rejected application keeps its Rejected status;
    /// only the status it would return to is updated.
    pub fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
        if self.is_rejected() {
            self.status_before_rejection = Some(stage.status());
        } else {
            self.status = stage.status();
        }
    }

    pub fn toggle_rejected(&mut self, policy: UnrejectPolicy) {
        if self.is_rejected() {
            let previous = self.status_before_rejection.take();
            self.status = match policy {
                UnrejectPolicy::Interviewing => ApplicationStatus::Interviewing,
                UnrejectPolicy::Restore => previous.unwrap_or_else(|| self.stage.status()),
            };
        } else {
            self.status_before_rejection = Some(self.status);
            self.status = ApplicationStatus::Rejected;
        }
    }

    pub fn interview_mut(&mut self, interview_id: &str) -> Option<&mut Interview> {
        self.interviews.iter_mut().find(|i| i.id == interview_id)
    }

    /// Case-insensitive substring match on company name or position title.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.company_name.to_lowercase().contains(&query)
            || self.position_title.to_lowercase().contains(&query)
    }
}

/// Values typed into the "track new position" form.
#[derive(Debug, Clone, Default)]
pub struct NewApplication {
    pub company_name: String,
    pub position_title: String,
    pub category: Category,
    pub location: Option<String>,
    pub channel: Option<String>,
    pub jd_link: Option<String>,
    pub jd_text: Option<String>,
}
