use anyhow::{anyhow, Result};

use crate::ai::{non_blank, JobAnalysis};
use crate::auth::AuthProvider;
use crate::models::{
    ApplicationStatus, CategoryFilter, Interview, InterviewPatch, JobApplication, Lang,
    NewApplication, Stage, UnrejectPolicy, UserProfile,
};
use crate::storage::KeyValueStore;

pub const APPLICATIONS_KEY: &str = "job_pursuit_v3_data";
pub const LANG_KEY: &str = "app_lang";
pub const USER_KEY: &str = "job_pursuit_user";
/// Last application list that failed to parse, kept before it is overwritten.
pub const DISCARDED_APPLICATIONS_KEY: &str = "job_pursuit_v3_data_discarded";

const DEFAULT_INTERVIEW_TIME: &str = "14:00";

/// Yes/no question asked before a destructive change.
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> Confirm for F {
    fn confirm(&mut self, question: &str) -> bool {
        self(question)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunnelStats {
    pub total: usize,
    pub interviewing: usize,
    pub offers: usize,
    pub rejected: usize,
    pub interview_rate: String,
    pub offer_rate: String,
}

/// Owns the application list, the signed-in profile and the language
/// preference. Every mutation is written to `storage` first and only then
/// applied in memory, so a failed write leaves the store unchanged.
/// `Ok(false)` means the target id did not exist.
pub struct ApplicationStore<S: KeyValueStore> {
    storage: S,
    applications: Vec<JobApplication>,
    user: Option<UserProfile>,
    lang: Lang,
    unreject: UnrejectPolicy,
}

impl<S: KeyValueStore> ApplicationStore<S> {
    /// Reads persisted state. Absent or malformed values start empty.
    pub fn load(storage: S, unreject: UnrejectPolicy) -> Result<Self> {
        let applications = match storage.get(APPLICATIONS_KEY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, bytes = raw.len(), "discarding malformed application list");
                if let Err(e) = storage.set(DISCARDED_APPLICATIONS_KEY, &raw) {
                    tracing::warn!(error = %e, "could not keep a copy of the discarded list");
                }
                Vec::new()
            }),
            None => Vec::new(),
        };

        let user = match storage.get(USER_KEY)? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| tracing::warn!(error = %e, "discarding malformed user profile"))
                .ok(),
            None => None,
        };

        let lang = match storage.get(LANG_KEY)? {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "unknown language preference, using default");
                Lang::default()
            }),
            None => Lang::default(),
        };

        tracing::debug!(count = applications.len(), "loaded applications");
        Ok(Self {
            storage,
            applications,
            user,
            lang,
            unreject,
        })
    }

    pub fn applications(&self) -> &[JobApplication] {
        &self.applications
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn lang(&self) -> Lang {
        self.lang
    }

    pub fn get(&self, id: &str) -> Option<&JobApplication> {
        self.applications.iter().find(|a| a.id == id)
    }

    /// Resolves a full id or an unambiguous id prefix.
    pub fn find(&self, id_or_prefix: &str) -> Result<Option<&JobApplication>> {
        if let Some(app) = self.get(id_or_prefix) {
            return Ok(Some(app));
        }
        if id_or_prefix.is_empty() {
            return Ok(None);
        }
        let mut matches = self
            .applications
            .iter()
            .filter(|a| a.id.starts_with(id_or_prefix));
        match (matches.next(), matches.next()) {
            (Some(app), None) => Ok(Some(app)),
            (Some(_), Some(_)) => Err(anyhow!(
                "Id prefix '{}' matches more than one application",
                id_or_prefix
            )),
            _ => Ok(None),
        }
    }

    // --- Mutations ---

    /// Creates an application from the form, preferring AI-extracted values,
    /// and puts it first in the list. Returns the new id.
    pub fn add_application(
        &mut self,
        form: NewApplication,
        enrichment: Option<JobAnalysis>,
    ) -> Result<String> {
        let (ai_company, ai_position, ai_location, report) = match enrichment {
            Some(analysis) => (
                analysis.company_name,
                analysis.position_title,
                analysis.location,
                Some(analysis.report),
            ),
            None => (None, None, None, None),
        };

        let pick = |ai: &Option<String>, typed: Option<&str>, fallback: &str| {
            non_blank(ai)
                .or(typed.map(str::trim).filter(|s| !s.is_empty()))
                .unwrap_or(fallback)
                .to_string()
        };

        let app = JobApplication {
            id: uuid::Uuid::new_v4().to_string(),
            company_name: pick(&ai_company, Some(form.company_name.as_str()), "Unknown"),
            position_title: pick(&ai_position, Some(form.position_title.as_str()), "Unknown"),
            category: form.category,
            location: Some(pick(&ai_location, form.location.as_deref(), "N/A")),
            channel: form.channel.filter(|s| !s.trim().is_empty()),
            jd_link: form.jd_link.filter(|s| !s.trim().is_empty()),
            jd_text: form.jd_text.filter(|s| !s.trim().is_empty()),
            status: ApplicationStatus::Applied,
            applied_date: today(),
            interviews: Vec::new(),
            stage: Stage::Applied,
            ai_suggestions: report,
            my_reflections: String::new(),
            status_before_rejection: None,
        };

        let id = app.id.clone();
        let company = app.company_name.clone();
        let mut next = Vec::with_capacity(self.applications.len() + 1);
        next.push(app);
        next.extend(self.applications.iter().cloned());
        self.commit(next)?;
        tracing::info!(id = %id, company = %company, "application added");
        Ok(id)
    }

    /// Unknown ids are a no-op even when `target` is out of range.
    pub fn advance_stage(&mut self, id: &str, target: usize) -> Result<bool> {
        if self.get(id).is_none() {
            return Ok(false);
        }
        let stage = Stage::from_index(target)
            .ok_or_else(|| anyhow!("Stage index {} out of range 0-5", target))?;
        self.mutate(id, |app| app.set_stage(stage))
    }

    pub fn toggle_rejected(&mut self, id: &str) -> Result<bool> {
        let policy = self.unreject;
        self.mutate(id, |app| app.toggle_rejected(policy))
    }

    pub fn set_reflections(&mut self, id: &str, text: &str) -> Result<bool> {
        self.mutate(id, |app| app.my_reflections = text.to_string())
    }

    /// Appends an interview named after the application's current milestone.
    pub fn add_interview(&mut self, id: &str) -> Result<Option<String>> {
        let Some(pos) = self.position(id) else {
            return Ok(None);
        };
        let mut next = self.applications.clone();
        let app = &mut next[pos];

        let interview = Interview {
            id: uuid::Uuid::new_v4().to_string(),
            round: default_round_label(&self.lang.milestones(), app.stage.index()),
            date: today(),
            time: Some(DEFAULT_INTERVIEW_TIME.to_string()),
            interviewer_info: String::new(),
            meeting_link: None,
            notes: String::new(),
            reflections: String::new(),
            experience_rating: 0,
            is_completed: false,
        };
        let interview_id = interview.id.clone();
        app.interviews.push(interview);

        self.commit(next)?;
        tracing::info!(application = %id, interview = %interview_id, "interview added");
        Ok(Some(interview_id))
    }

    pub fn update_interview(
        &mut self,
        id: &str,
        interview_id: &str,
        patch: InterviewPatch,
    ) -> Result<bool> {
        let Some(pos) = self.position(id) else {
            return Ok(false);
        };
        let mut next = self.applications.clone();
        let Some(interview) = next[pos].interview_mut(interview_id) else {
            return Ok(false);
        };
        patch.apply(interview);
        self.commit(next)?;
        Ok(true)
    }

    /// Removes an interview once `confirm` says yes.
    pub fn delete_interview(
        &mut self,
        id: &str,
        interview_id: &str,
        confirm: &mut dyn Confirm,
    ) -> Result<bool> {
        let Some(pos) = self.position(id) else {
            return Ok(false);
        };
        let interviews = &self.applications[pos].interviews;
        let Some(at) = interviews.iter().position(|i| i.id == interview_id) else {
            return Ok(false);
        };

        let question = format!("Delete this stage ({})?", interviews[at].round);
        if !confirm.confirm(&question) {
            return Ok(false);
        }

        let mut next = self.applications.clone();
        next[pos].interviews.remove(at);
        self.commit(next)?;
        tracing::info!(application = %id, interview = %interview_id, "interview deleted");
        Ok(true)
    }

    pub fn set_lang(&mut self, lang: Lang) -> Result<()> {
        self.storage.set(LANG_KEY, lang.as_str())?;
        self.lang = lang;
        Ok(())
    }

    /// On failure the session stays signed out and the error is returned.
    pub fn sign_in(&mut self, auth: &dyn AuthProvider) -> Result<&UserProfile> {
        let profile = auth.sign_in()?;
        self.storage.set(USER_KEY, &serde_json::to_string(&profile)?)?;
        let profile = &*self.user.insert(profile);
        Ok(profile)
    }

    pub fn sign_out(&mut self, auth: Option<&dyn AuthProvider>) -> Result<()> {
        if let Some(auth) = auth {
            if let Err(e) = auth.sign_out() {
                tracing::warn!(provider = auth.provider().as_str(), error = %e, "provider sign-out failed");
            }
        }
        self.storage.remove(USER_KEY)?;
        self.user = None;
        Ok(())
    }

    // --- Derived views ---

    pub fn filter(&self, query: &str, category: CategoryFilter) -> Vec<&JobApplication> {
        self.applications
            .iter()
            .filter(|a| a.matches_query(query) && category.matches(a.category))
            .collect()
    }

    pub fn stats(&self) -> FunnelStats {
        funnel_stats(&self.applications)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.applications.iter().position(|a| a.id == id)
    }

    fn mutate(&mut self, id: &str, change: impl FnOnce(&mut JobApplication)) -> Result<bool> {
        let Some(pos) = self.position(id) else {
            return Ok(false);
        };
        let mut next = self.applications.clone();
        change(&mut next[pos]);
        let (status, stage) = (next[pos].status, next[pos].stage.index());
        self.commit(next)?;
        tracing::info!(id = %id, status = %status, stage, "application updated");
        Ok(true)
    }

    /// Writes `next` and adopts it only once the write succeeded.
    fn commit(&mut self, next: Vec<JobApplication>) -> Result<()> {
        let json = serde_json::to_string(&next)?;
        self.storage.set(APPLICATIONS_KEY, &json)?;
        self.applications = next;
        Ok(())
    }
}

pub fn funnel_stats(applications: &[JobApplication]) -> FunnelStats {
    let total = applications.len();
    let interviewing = applications
        .iter()
        .filter(|a| a.stage.is_interviewing())
        .count();
    let offers = applications
        .iter()
        .filter(|a| a.stage == Stage::Offer && a.status == ApplicationStatus::Offer)
        .count();
    let rejected = applications.iter().filter(|a| a.is_rejected()).count();

    FunnelStats {
        total,
        interviewing,
        offers,
        rejected,
        interview_rate: rate(interviewing, total),
        offer_rate: rate(offers, total),
    }
}

fn rate(count: usize, total: usize) -> String {
    if total == 0 {
        return "0".to_string();
    }
    // Halves round up: 1 of 16 is 6.3
    let tenths = (count as f64 * 1000.0 / total as f64).round();
    format!("{:.1}", tenths / 10.0)
}

pub fn default_round_label(milestones: &[&str], stage_index: usize) -> String {
    let index = stage_index.min(milestones.len().saturating_sub(1));
    let name = milestones.get(index).copied().unwrap_or_default();
    format!("{} Interview", name)
}

fn today() -> String {
    chrono::Local::now().date_naive().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AiReport, Category, Provider};
    use crate::storage::SqliteStore;
    use std::cell::Cell;

    fn empty_store() -> ApplicationStore<SqliteStore> {
        ApplicationStore::load(SqliteStore::open_in_memory().unwrap(), UnrejectPolicy::default())
            .unwrap()
    }

    fn form(company: &str, position: &str, category: Category) -> NewApplication {
        NewApplication {
            company_name: company.to_string(),
            position_title: position.to_string(),
            category,
            ..Default::default()
        }
    }

    fn analysis(company: Option<&str>, location: Option<&str>) -> JobAnalysis {
        JobAnalysis {
            company_name: company.map(str::to_string),
            position_title: None,
            location: location.map(str::to_string),
            report: AiReport {
                summary: "A role.".to_string(),
                responsibilities: vec!["Ship".to_string()],
                requirements: vec![],
                suitability_assessment: String::new(),
                interview_tips: vec![],
                potential_questions: vec!["Why us?".to_string()],
                sources: vec![],
            },
        }
    }

    struct FailingAuth;

    impl AuthProvider for FailingAuth {
        fn sign_in(&self) -> Result<UserProfile> {
            Err(anyhow!("popup closed"))
        }
        fn sign_out(&self) -> Result<()> {
            Err(anyhow!("offline"))
        }
        fn provider(&self) -> Provider {
            Provider::Google
        }
    }

    struct FixedAuth;

    impl AuthProvider for FixedAuth {
        fn sign_in(&self) -> Result<UserProfile> {
            Ok(UserProfile {
                id: "u1".to_string(),
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                picture: None,
                provider: Some(Provider::Google),
            })
        }
        fn sign_out(&self) -> Result<()> {
            Ok(())
        }
        fn provider(&self) -> Provider {
            Provider::Google
        }
    }

    #[test]
    fn test_load_empty_storage() {
        let store = empty_store();
        assert!(store.applications().is_empty());
        assert!(store.user().is_none());
        assert_eq!(store.lang(), Lang::Zh);
    }

    #[test]
    fn test_load_malformed_state_is_absent() {
        let storage = SqliteStore::open_in_memory().unwrap();
        storage.set(APPLICATIONS_KEY, "{not json").unwrap();
        storage.set(USER_KEY, "[]").unwrap();
        storage.set(LANG_KEY, "fr").unwrap();
        let store = ApplicationStore::load(storage, UnrejectPolicy::default()).unwrap();
        assert!(store.applications().is_empty());
        assert!(store.user().is_none());
        assert_eq!(store.lang(), Lang::Zh);
    }

    #[test]
    fn test_load_keeps_copy_of_discarded_list() {
        let storage = SqliteStore::open_in_memory().unwrap();
        storage.set(APPLICATIONS_KEY, r#"[{"id":"a","currentStageIndex":9}]"#).unwrap();
        let mut store = ApplicationStore::load(storage, UnrejectPolicy::default()).unwrap();
        assert!(store.applications().is_empty());

        store.add_application(form("A", "x", Category::Tech), None).unwrap();
        assert_eq!(
            store.storage.get(DISCARDED_APPLICATIONS_KEY).unwrap().as_deref(),
            Some(r#"[{"id":"a","currentStageIndex":9}]"#)
        );
    }

    /// Sqlite-backed store whose writes can be switched off.
    struct FlakyStore {
        inner: SqliteStore,
        writable: Cell<bool>,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: SqliteStore::open_in_memory().unwrap(),
                writable: Cell::new(true),
            }
        }

        fn check(&self) -> Result<()> {
            if self.writable.get() {
                Ok(())
            } else {
                Err(anyhow!("disk full"))
            }
        }
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &str) -> Result<()> {
            self.check()?;
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> Result<()> {
            self.check()?;
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_failed_write_leaves_state_unchanged() {
        let mut store = ApplicationStore::load(FlakyStore::new(), UnrejectPolicy::default()).unwrap();
        let id = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        let interview = store.add_interview(&id).unwrap().unwrap();
        store.sign_in(&FixedAuth).unwrap();
        let before = store.applications().to_vec();

        store.storage.writable.set(false);
        assert!(store.add_application(form("B", "x", Category::Tech), None).is_err());
        assert!(store.advance_stage(&id, 3).is_err());
        assert!(store.toggle_rejected(&id).is_err());
        assert!(store.set_reflections(&id, "note").is_err());
        assert!(store.add_interview(&id).is_err());
        let patch = InterviewPatch {
            notes: Some("went well".to_string()),
            ..Default::default()
        };
        assert!(store.update_interview(&id, &interview, patch).is_err());
        assert!(store.delete_interview(&id, &interview, &mut |_: &str| true).is_err());
        assert!(store.set_lang(Lang::En).is_err());
        assert!(store.sign_out(None).is_err());

        assert_eq!(store.applications(), before.as_slice());
        assert_eq!(store.lang(), Lang::Zh);
        assert!(store.user().is_some());

        // The next successful write must not carry the failed changes along
        store.storage.writable.set(true);
        store.set_reflections(&id, "kept").unwrap();
        let saved: Vec<JobApplication> =
            serde_json::from_str(&store.storage.get(APPLICATIONS_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].stage, Stage::Applied);
        assert_eq!(saved[0].status, ApplicationStatus::Applied);
        assert_eq!(saved[0].interviews.len(), 1);
        assert_eq!(saved[0].my_reflections, "kept");
    }

    #[test]
    fn test_add_application_defaults() {
        let mut store = empty_store();
        let id = store
            .add_application(form("Acme", "Engineer", Category::Tech), None)
            .unwrap();
        let app = store.get(&id).unwrap();
        assert_eq!(app.company_name, "Acme");
        assert_eq!(app.status, ApplicationStatus::Applied);
        assert_eq!(app.stage, Stage::Applied);
        assert_eq!(app.location.as_deref(), Some("N/A"));
        assert!(app.interviews.is_empty());
        assert_eq!(app.applied_date.len(), 10);
        assert!(chrono::NaiveDate::parse_from_str(&app.applied_date, "%Y-%m-%d").is_ok());
    }

    #[test]
    fn test_add_application_prefers_ai_values() {
        let mut store = empty_store();
        let id = store
            .add_application(
                form("acme inc", "", Category::Data),
                Some(analysis(Some("Acme Corp"), Some("Berlin"))),
            )
            .unwrap();
        let app = store.get(&id).unwrap();
        assert_eq!(app.company_name, "Acme Corp");
        // AI gave no title and the form was blank
        assert_eq!(app.position_title, "Unknown");
        assert_eq!(app.location.as_deref(), Some("Berlin"));
        assert_eq!(app.category, Category::Data);
        let report = app.ai_suggestions.as_ref().unwrap();
        assert_eq!(report.potential_questions, vec!["Why us?"]);
    }

    #[test]
    fn test_add_application_blank_ai_falls_back_to_form() {
        let mut store = empty_store();
        let id = store
            .add_application(form("Beta", "Designer", Category::Design), Some(analysis(Some("  "), None)))
            .unwrap();
        assert_eq!(store.get(&id).unwrap().company_name, "Beta");
    }

    #[test]
    fn test_add_application_prepends() {
        let mut store = empty_store();
        let first = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        let second = store.add_application(form("B", "y", Category::Tech), None).unwrap();
        let ids: Vec<&str> = store.applications().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec![second.as_str(), first.as_str()]);
    }

    #[test]
    fn test_advance_stage_sets_status() {
        let mut store = empty_store();
        let id = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        for target in 0..=5 {
            assert!(store.advance_stage(&id, target).unwrap());
            let app = store.get(&id).unwrap();
            assert_eq!(app.stage.index(), target);
            let expected = match target {
                0 => ApplicationStatus::Applied,
                5 => ApplicationStatus::Offer,
                _ => ApplicationStatus::Interviewing,
            };
            assert_eq!(app.status, expected);
        }
    }

    #[test]
    fn test_advance_stage_out_of_range_and_unknown() {
        let mut store = empty_store();
        let id = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        assert!(store.advance_stage(&id, 6).is_err());
        assert!(!store.advance_stage("missing", 2).unwrap());
        assert!(!store.advance_stage("missing", 9).unwrap());
    }

    #[test]
    fn test_advance_stage_leaves_rejected() {
        let mut store = empty_store();
        let id = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        store.toggle_rejected(&id).unwrap();
        store.advance_stage(&id, 3).unwrap();
        let app = store.get(&id).unwrap();
        assert_eq!(app.stage, Stage::Round2);
        assert_eq!(app.status, ApplicationStatus::Rejected);
    }

    #[test]
    fn test_toggle_rejected_twice_lands_on_interviewing() {
        let mut store = empty_store();
        let id = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        store.toggle_rejected(&id).unwrap();
        assert!(store.get(&id).unwrap().is_rejected());
        store.toggle_rejected(&id).unwrap();
        // lossy: the application was Applied before
        assert_eq!(store.get(&id).unwrap().status, ApplicationStatus::Interviewing);
        assert!(!store.toggle_rejected("missing").unwrap());
    }

    #[test]
    fn test_toggle_rejected_restore_policy() {
        let storage = SqliteStore::open_in_memory().unwrap();
        let mut store = ApplicationStore::load(storage, UnrejectPolicy::Restore).unwrap();
        let id = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        store.toggle_rejected(&id).unwrap();
        store.toggle_rejected(&id).unwrap();
        assert_eq!(store.get(&id).unwrap().status, ApplicationStatus::Applied);
    }

    #[test]
    fn test_add_interview_label_follows_stage() {
        let mut store = empty_store();
        store.set_lang(Lang::En).unwrap();
        let id = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        store.advance_stage(&id, 2).unwrap();
        let interview_id = store.add_interview(&id).unwrap().unwrap();

        let app = store.get(&id).unwrap();
        let interview = &app.interviews[0];
        assert_eq!(interview.id, interview_id);
        assert_eq!(interview.round, "Round 1 Interview");
        assert_eq!(interview.time.as_deref(), Some("14:00"));
        assert!(!interview.is_completed);
        assert_eq!(interview.experience_rating, 0);
    }

    #[test]
    fn test_add_interview_unknown_application() {
        let mut store = empty_store();
        assert_eq!(store.add_interview("missing").unwrap(), None);
    }

    #[test]
    fn test_default_round_label() {
        let names = ["Applied", "Screening", "Round1", "Round2", "Final", "Offer"];
        assert_eq!(default_round_label(&names, 2), "Round1 Interview");
        assert_eq!(default_round_label(&names, 9), "Offer Interview");
    }

    #[test]
    fn test_interviews_keep_insertion_order() {
        let mut store = empty_store();
        store.set_lang(Lang::En).unwrap();
        let id = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        store.add_interview(&id).unwrap();
        store.advance_stage(&id, 1).unwrap();
        store.add_interview(&id).unwrap();
        let rounds: Vec<&str> = store.get(&id).unwrap().interviews.iter().map(|i| i.round.as_str()).collect();
        assert_eq!(rounds, vec!["Applied Interview", "Screening Interview"]);
    }

    #[test]
    fn test_update_interview_merges_fields() {
        let mut store = empty_store();
        let id = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        let first = store.add_interview(&id).unwrap().unwrap();
        let second = store.add_interview(&id).unwrap().unwrap();

        let patch = InterviewPatch {
            notes: Some("system design".to_string()),
            is_completed: Some(true),
            ..Default::default()
        };
        assert!(store.update_interview(&id, &second, patch).unwrap());

        let app = store.get(&id).unwrap();
        assert_eq!(app.interviews[1].notes, "system design");
        assert!(app.interviews[1].is_completed);
        assert_eq!(app.interviews[0].id, first);
        assert_eq!(app.interviews[0].notes, "");
        assert!(!app.interviews[0].is_completed);
    }

    #[test]
    fn test_update_unknown_interview_is_noop() {
        let mut store = empty_store();
        let id = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        store.add_interview(&id).unwrap();
        let before = store.get(&id).unwrap().clone();

        let patch = InterviewPatch {
            round: Some("HR".to_string()),
            ..Default::default()
        };
        assert!(!store.update_interview(&id, "nope", patch.clone()).unwrap());
        assert!(!store.update_interview("nope", &before.interviews[0].id, patch).unwrap());
        assert_eq!(store.get(&id).unwrap(), &before);
    }

    #[test]
    fn test_delete_interview_requires_confirmation() {
        let mut store = empty_store();
        let id = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        let interview_id = store.add_interview(&id).unwrap().unwrap();

        let mut asked = Vec::new();
        let mut decline = |q: &str| {
            asked.push(q.to_string());
            false
        };
        assert!(!store.delete_interview(&id, &interview_id, &mut decline).unwrap());
        assert_eq!(asked.len(), 1);
        assert_eq!(store.get(&id).unwrap().interviews.len(), 1);

        let mut accept = |_: &str| true;
        assert!(store.delete_interview(&id, &interview_id, &mut accept).unwrap());
        assert!(store.get(&id).unwrap().interviews.is_empty());
    }

    #[test]
    fn test_delete_unknown_interview_does_not_ask() {
        let mut store = empty_store();
        let id = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        let mut never = |_: &str| -> bool { panic!("should not ask") };
        assert!(!store.delete_interview(&id, "nope", &mut never).unwrap());
    }

    #[test]
    fn test_filter() {
        let mut store = empty_store();
        store.add_application(form("beta", "Visual Designer", Category::Design), None).unwrap();
        store.add_application(form("Acme", "Engineer", Category::Tech), None).unwrap();

        let all = store.filter("", CategoryFilter::All);
        let names: Vec<&str> = all.iter().map(|a| a.company_name.as_str()).collect();
        assert_eq!(names, vec!["Acme", "beta"]);

        let acme = store.filter("ac", CategoryFilter::All);
        assert_eq!(acme.len(), 1);
        assert_eq!(acme[0].company_name, "Acme");

        let design = store.filter("", CategoryFilter::Only(Category::Design));
        assert_eq!(design.len(), 1);
        assert_eq!(design[0].company_name, "beta");

        // title match, case-insensitive
        assert_eq!(store.filter("VISUAL", CategoryFilter::All).len(), 1);
        assert!(store.filter("acme", CategoryFilter::Only(Category::Design)).is_empty());
    }

    #[test]
    fn test_stats_empty() {
        let stats = empty_store().stats();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.interview_rate, "0");
        assert_eq!(stats.offer_rate, "0");
    }

    #[test]
    fn test_stats_funnel() {
        let mut store = empty_store();
        let a = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        let b = store.add_application(form("B", "x", Category::Tech), None).unwrap();
        let c = store.add_application(form("C", "x", Category::Tech), None).unwrap();
        store.add_application(form("D", "x", Category::Tech), None).unwrap();

        store.advance_stage(&a, 2).unwrap();
        store.advance_stage(&b, 5).unwrap();
        store.advance_stage(&c, 5).unwrap();
        store.toggle_rejected(&c).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.interviewing, 1);
        // c sits at the offer stage but is rejected
        assert_eq!(stats.offers, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.interview_rate, "25.0");
        assert_eq!(stats.offer_rate, "25.0");
    }

    #[test]
    fn test_stats_rate_rounding() {
        let mut store = empty_store();
        let a = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        store.add_application(form("B", "x", Category::Tech), None).unwrap();
        store.add_application(form("C", "x", Category::Tech), None).unwrap();
        store.advance_stage(&a, 1).unwrap();
        assert_eq!(store.stats().interview_rate, "33.3");
    }

    #[test]
    fn test_stats_rate_rounds_halves_up() {
        let mut store = empty_store();
        let first = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        for _ in 0..15 {
            store.add_application(form("B", "x", Category::Tech), None).unwrap();
        }
        store.advance_stage(&first, 1).unwrap();
        assert_eq!(store.stats().interview_rate, "6.3");
        assert_eq!(rate(1, 80), "1.3");
        assert_eq!(rate(1, 400), "0.3");
        assert_eq!(rate(0, 7), "0.0");
        assert_eq!(rate(0, 0), "0");
    }

    #[test]
    fn test_find_by_prefix() {
        let mut store = empty_store();
        let id = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        assert_eq!(store.find(&id).unwrap().unwrap().id, id);
        assert_eq!(store.find(&id[..8]).unwrap().unwrap().id, id);
        assert!(store.find("zzzz").unwrap().is_none());
        assert!(store.find("").unwrap().is_none());
    }

    #[test]
    fn test_set_reflections() {
        let mut store = empty_store();
        let id = store.add_application(form("A", "x", Category::Tech), None).unwrap();
        assert!(store.set_reflections(&id, "follow up friday").unwrap());
        assert_eq!(store.get(&id).unwrap().my_reflections, "follow up friday");
    }

    #[test]
    fn test_sign_in_failure_leaves_session_empty() {
        let mut store = empty_store();
        assert!(store.sign_in(&FailingAuth).is_err());
        assert!(store.user().is_none());
    }

    #[test]
    fn test_sign_in_and_out() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store =
                ApplicationStore::load(SqliteStore::open(dir.path()).unwrap(), UnrejectPolicy::default()).unwrap();
            assert_eq!(store.sign_in(&FixedAuth).unwrap().name, "Ada");
        }
        let mut store =
            ApplicationStore::load(SqliteStore::open(dir.path()).unwrap(), UnrejectPolicy::default()).unwrap();
        assert_eq!(store.user().unwrap().id, "u1");

        // a failing provider sign-out still clears the local session
        store.sign_out(Some(&FailingAuth)).unwrap();
        assert!(store.user().is_none());
        let reopened =
            ApplicationStore::load(SqliteStore::open(dir.path()).unwrap(), UnrejectPolicy::default()).unwrap();
        assert!(reopened.user().is_none());
    }

    #[test]
    fn test_persist_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let before = {
            let storage = SqliteStore::open(dir.path()).unwrap();
            let mut store = ApplicationStore::load(storage, UnrejectPolicy::default()).unwrap();
            store.set_lang(Lang::En).unwrap();
            let a = store
                .add_application(form("Acme", "PM", Category::Product), Some(analysis(None, Some("Remote"))))
                .unwrap();
            store.add_application(form("Beta", "Ops lead", Category::Ops), None).unwrap();
            store.advance_stage(&a, 4).unwrap();
            let i = store.add_interview(&a).unwrap().unwrap();
            store
                .update_interview(
                    &a,
                    &i,
                    InterviewPatch {
                        meeting_link: Some("https://meet.example.com/abc".to_string()),
                        experience_rating: Some(5),
                        ..Default::default()
                    },
                )
                .unwrap();
            store.toggle_rejected(&a).unwrap();
            store.applications().to_vec()
        };

        let storage = SqliteStore::open(dir.path()).unwrap();
        let store = ApplicationStore::load(storage, UnrejectPolicy::default()).unwrap();
        assert_eq!(store.applications(), before.as_slice());
        assert_eq!(store.lang(), Lang::En);
    }
}
