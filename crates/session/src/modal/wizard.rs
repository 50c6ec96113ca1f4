//! Create and edit wizards: linear steps ending in a single submit.

use argonav_api::ApiError;
use argonav_core::{AppSpec, Application, SyncPolicy};

use super::Outcome;
use crate::input::TextInput;
use crate::keys::Key;
use crate::msg::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WizardKind {
    Create,
    Edit,
}

impl WizardKind {
    fn steps(self) -> &'static [Step] {
        match self {
            WizardKind::Create => &[
                Step::Name,
                Step::Project,
                Step::Repo,
                Step::Path,
                Step::Revision,
                Step::Cluster,
                Step::Namespace,
                Step::SyncPolicy,
                Step::Confirm,
            ],
            WizardKind::Edit => &[
                Step::Repo,
                Step::Path,
                Step::Revision,
                Step::Cluster,
                Step::Namespace,
                Step::SyncPolicy,
                Step::Confirm,
            ],
        }
    }

    fn verb(self) -> &'static str {
        match self {
            WizardKind::Create => "create",
            WizardKind::Edit => "update",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Name,
    Project,
    Repo,
    Path,
    Revision,
    Cluster,
    Namespace,
    SyncPolicy,
    Confirm,
}

impl Step {
    pub fn label(self) -> &'static str {
        match self {
            Step::Name => "name",
            Step::Project => "project",
            Step::Repo => "repository",
            Step::Path => "path",
            Step::Revision => "revision",
            Step::Cluster => "cluster",
            Step::Namespace => "namespace",
            Step::SyncPolicy => "sync policy",
            Step::Confirm => "confirm",
        }
    }

    /// Steps whose value is picked from a server-provided list.
    pub fn is_list(self) -> bool {
        matches!(self, Step::Project | Step::Repo | Step::Cluster)
    }

    fn is_text(self) -> bool {
        !matches!(self, Step::SyncPolicy | Step::Confirm)
    }

    fn field(self, spec: &AppSpec) -> &str {
        match self {
            Step::Name => spec.name.as_str(),
            Step::Project => spec.project.as_str(),
            Step::Repo => spec.repo_url.as_str(),
            Step::Path => spec.path.as_str(),
            Step::Revision => spec.revision.as_str(),
            Step::Cluster => spec.cluster.as_str(),
            Step::Namespace => spec.namespace.as_str(),
            Step::SyncPolicy | Step::Confirm => "",
        }
    }

    fn field_mut(self, spec: &mut AppSpec) -> Option<&mut String> {
        match self {
            Step::Name => Some(&mut spec.name),
            Step::Project => Some(&mut spec.project),
            Step::Repo => Some(&mut spec.repo_url),
            Step::Path => Some(&mut spec.path),
            Step::Revision => Some(&mut spec.revision),
            Step::Cluster => Some(&mut spec.cluster),
            Step::Namespace => Some(&mut spec.namespace),
            Step::SyncPolicy | Step::Confirm => None,
        }
    }
}

/// Server-provided pick lists. Edit never loads projects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Choices {
    pub projects: Vec<String>,
    pub repositories: Vec<String>,
    pub clusters: Vec<String>,
    pub loading: bool,
}

impl Choices {
    pub fn for_step(&self, step: Step) -> &[String] {
        match step {
            Step::Project => &self.projects,
            Step::Repo => &self.repositories,
            Step::Cluster => &self.clusters,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wizard {
    pub kind: WizardKind,
    pub ticket: u64,
    pub index: usize,
    pub spec: AppSpec,
    pub input: TextInput,
    pub choices: Choices,
    pub cursor: usize,
    pub submitting: bool,
    pub error: Option<String>,
}

impl Wizard {
    pub(crate) fn create(ticket: u64) -> (Self, Command) {
        let spec = AppSpec { revision: "main".into(), sync_policy: SyncPolicy::Manual, ..Default::default() };
        let wizard = Self::new(WizardKind::Create, ticket, spec);
        (wizard, Command::LoadChoices { ticket, projects: true })
    }

    /// Pre-populated from `app`; a blank revision becomes `main`.
    pub(crate) fn edit(ticket: u64, app: &Application) -> (Self, Command) {
        let mut spec = AppSpec::from_application(app);
        if spec.revision.trim().is_empty() {
            spec.revision = "main".into();
        }
        let wizard = Self::new(WizardKind::Edit, ticket, spec);
        (wizard, Command::LoadChoices { ticket, projects: false })
    }

    fn new(kind: WizardKind, ticket: u64, spec: AppSpec) -> Self {
        let mut wizard = Self {
            kind,
            ticket,
            index: 0,
            spec,
            input: TextInput::default(),
            choices: Choices { loading: true, ..Default::default() },
            cursor: 0,
            submitting: false,
            error: None,
        };
        wizard.enter_step();
        wizard
    }

    pub fn steps(&self) -> &'static [Step] {
        self.kind.steps()
    }

    pub fn step(&self) -> Step {
        self.steps().get(self.index).copied().unwrap_or(Step::Confirm)
    }

    /// Current list for a list step, empty otherwise.
    pub fn options(&self) -> &[String] {
        self.choices.for_step(self.step())
    }

    /// A list step with nothing to pick from is typed instead.
    pub fn is_typing(&self) -> bool {
        let step = self.step();
        step.is_text() && (!step.is_list() || (!self.choices.loading && self.options().is_empty()))
    }

    fn enter_step(&mut self) {
        let step = self.step();
        let current = step.field(&self.spec).to_string();
        self.cursor = self.options().iter().position(|o| *o == current).unwrap_or(0);
        self.input.set(current);
    }

    fn advance(&mut self) {
        if self.index + 1 < self.steps().len() {
            self.index += 1;
            self.enter_step();
        }
    }

    fn back(&mut self) {
        if self.is_typing() {
            let value = self.input.value().to_string();
            if let Some(field) = self.step().field_mut(&mut self.spec) {
                *field = value;
            }
        }
        if self.index > 0 {
            self.index -= 1;
            self.enter_step();
        }
    }

    pub(crate) fn handle_key(&mut self, key: Key) -> Outcome {
        if key == Key::Esc {
            return Outcome::Close(Some(format!("{} cancelled", self.kind.verb())));
        }
        if self.submitting {
            return Outcome::Hint(format!("{} in progress", self.kind.verb()));
        }
        if key == Key::Left {
            self.back();
            return Outcome::Stay;
        }
        match self.step() {
            Step::Confirm => self.confirm_key(key),
            Step::SyncPolicy => {
                match key {
                    Key::Char('a') => self.spec.sync_policy = SyncPolicy::Auto,
                    Key::Char('m') => self.spec.sync_policy = SyncPolicy::Manual,
                    Key::Up | Key::Down | Key::Char(' ') | Key::Char('j') | Key::Char('k') => {
                        self.spec.sync_policy = self.spec.sync_policy.toggled()
                    }
                    Key::Enter => self.advance(),
                    _ => {}
                }
                Outcome::Stay
            }
            step if self.is_typing() => match key {
                Key::Enter if self.input.is_blank() => Outcome::Hint(format!("{} is required", step.label())),
                Key::Enter => {
                    let value = self.input.value().trim().to_string();
                    if let Some(field) = step.field_mut(&mut self.spec) {
                        *field = value;
                    }
                    self.advance();
                    Outcome::Stay
                }
                other => {
                    self.input.edit(other);
                    Outcome::Stay
                }
            },
            step => self.list_key(step, key),
        }
    }

    fn list_key(&mut self, step: Step, key: Key) -> Outcome {
        if self.choices.loading {
            return match key {
                Key::Enter => Outcome::Hint(format!("loading {} choices", step.label())),
                _ => Outcome::Stay,
            };
        }
        let len = self.options().len();
        if let Some(delta) = key.vertical() {
            self.cursor = self.cursor.saturating_add_signed(delta).min(len.saturating_sub(1));
            return Outcome::Stay;
        }
        if key == Key::Enter {
            if let Some(picked) = self.options().get(self.cursor).cloned() {
                if let Some(field) = step.field_mut(&mut self.spec) {
                    *field = picked;
                }
                self.advance();
            }
        }
        Outcome::Stay
    }

    fn confirm_key(&mut self, key: Key) -> Outcome {
        match key {
            Key::Char('n') => Outcome::Close(Some(format!("{} cancelled", self.kind.verb()))),
            Key::Char('y') => {
                if let Err(e) = self.spec.validate() {
                    self.error = Some(e.to_string());
                    return Outcome::Hint(e.to_string());
                }
                self.submitting = true;
                self.error = None;
                let spec = self.spec.clone();
                Outcome::Issue(match self.kind {
                    WizardKind::Create => Command::Create { ticket: self.ticket, spec },
                    WizardKind::Edit => Command::Update { ticket: self.ticket, spec },
                })
            }
            _ => Outcome::Stay,
        }
    }

    /// Apply loaded pick lists. A failed list leaves that step as free text.
    /// A current value missing from its list is offered first, so Enter keeps it.
    pub(crate) fn on_choices(
        &mut self,
        projects: Option<Result<Vec<String>, ApiError>>,
        repositories: Result<Vec<String>, ApiError>,
        clusters: Result<Vec<String>, ApiError>,
    ) {
        self.choices.loading = false;
        let mut errors = Vec::new();
        let mut take = |label: &str, result: Result<Vec<String>, ApiError>| match result {
            Ok(list) => list,
            Err(e) => {
                errors.push(format!("{label}: {e}"));
                Vec::new()
            }
        };
        if let Some(projects) = projects {
            self.choices.projects = take("projects", projects);
            keep_current(&mut self.choices.projects, &self.spec.project);
        }
        self.choices.repositories = take("repositories", repositories);
        self.choices.clusters = take("clusters", clusters);
        keep_current(&mut self.choices.repositories, &self.spec.repo_url);
        keep_current(&mut self.choices.clusters, &self.spec.cluster);
        if !errors.is_empty() {
            self.error = Some(errors.join("; "));
        }
        self.enter_step();
    }

    pub(crate) fn on_done(&mut self, result: Result<(), ApiError>) -> Outcome {
        self.submitting = false;
        match result {
            Ok(()) => {
                let verb = match self.kind {
                    WizardKind::Create => "created",
                    WizardKind::Edit => "updated",
                };
                Outcome::Close(Some(format!("{} {}", verb, self.spec.name)))
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Outcome::Stay
            }
        }
    }
}

fn keep_current(list: &mut Vec<String>, current: &str) {
    if !current.is_empty() && !list.iter().any(|o| o == current) {
        list.insert(0, current.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_str(w: &mut Wizard, s: &str) {
        for c in s.chars() {
            w.handle_key(Key::Char(c));
        }
    }

    fn loaded_create() -> Wizard {
        let (mut w, _) = Wizard::create(5);
        w.on_choices(
            Some(Ok(vec!["default".into(), "platform".into()])),
            Ok(vec!["https://git/a".into(), "https://git/b".into()]),
            Ok(vec!["https://kubernetes.default.svc".into()]),
        );
        w
    }

    #[test]
    fn create_walks_every_step_and_submits_once() {
        let mut w = loaded_create();
        assert_eq!(w.step(), Step::Name);
        assert!(matches!(w.handle_key(Key::Enter), Outcome::Hint(_)));
        type_str(&mut w, "web");
        w.handle_key(Key::Enter);
        assert_eq!(w.step(), Step::Project);
        w.handle_key(Key::Down);
        w.handle_key(Key::Enter);
        w.handle_key(Key::Enter);
        assert_eq!(w.step(), Step::Path);
        type_str(&mut w, "deploy");
        w.handle_key(Key::Enter);
        assert_eq!(w.input.value(), "main");
        w.handle_key(Key::Enter);
        w.handle_key(Key::Enter);
        type_str(&mut w, "web");
        w.handle_key(Key::Enter);
        assert_eq!(w.step(), Step::SyncPolicy);
        w.handle_key(Key::Char('a'));
        w.handle_key(Key::Enter);
        assert_eq!(w.step(), Step::Confirm);

        let expected = AppSpec {
            name: "web".into(),
            project: "platform".into(),
            repo_url: "https://git/a".into(),
            path: "deploy".into(),
            revision: "main".into(),
            cluster: "https://kubernetes.default.svc".into(),
            namespace: "web".into(),
            sync_policy: SyncPolicy::Auto,
        };
        assert_eq!(w.handle_key(Key::Char('y')), Outcome::Issue(Command::Create { ticket: 5, spec: expected }));
        assert!(matches!(w.handle_key(Key::Char('y')), Outcome::Hint(_)));
    }

    #[test]
    fn back_step_preserves_typed_values() {
        let mut w = loaded_create();
        type_str(&mut w, "web");
        w.handle_key(Key::Enter);
        w.handle_key(Key::Enter);
        w.handle_key(Key::Enter);
        type_str(&mut w, "half");
        w.handle_key(Key::Left);
        assert_eq!(w.step(), Step::Repo);
        w.handle_key(Key::Left);
        w.handle_key(Key::Left);
        assert_eq!(w.step(), Step::Name);
        assert_eq!(w.input.value(), "web");
        assert_eq!(w.spec.path, "half");
        w.handle_key(Key::Left);
        assert_eq!(w.index, 0);
    }

    #[test]
    fn list_steps_wait_for_choices_then_fall_back_to_text() {
        let (mut w, cmd) = Wizard::create(2);
        assert_eq!(cmd, Command::LoadChoices { ticket: 2, projects: true });
        type_str(&mut w, "web");
        w.handle_key(Key::Enter);
        assert!(matches!(w.handle_key(Key::Enter), Outcome::Hint(_)));
        assert_eq!(w.step(), Step::Project);
        w.on_choices(Some(Err(ApiError::Auth("no token".into()))), Ok(Vec::new()), Ok(Vec::new()));
        assert!(w.error.as_deref().is_some_and(|e| e.starts_with("projects")));
        assert!(w.is_typing());
        type_str(&mut w, "default");
        w.handle_key(Key::Enter);
        assert_eq!(w.spec.project, "default");
    }

    #[test]
    fn edit_prepopulates_and_keeps_project() {
        let app = Application {
            name: "web".into(),
            project: "platform".into(),
            repo_url: "https://git/b".into(),
            path: "k8s".into(),
            revision: "v2".into(),
            cluster: "https://c".into(),
            namespace: "web".into(),
            sync_policy: Some(SyncPolicy::Auto),
            ..Default::default()
        };
        let (mut w, cmd) = Wizard::edit(8, &app);
        assert_eq!(cmd, Command::LoadChoices { ticket: 8, projects: false });
        assert_eq!(w.step(), Step::Repo);
        w.on_choices(None, Ok(vec!["https://git/a".into(), "https://git/b".into()]), Ok(vec!["https://c".into()]));
        assert_eq!(w.cursor, 1);
        for _ in 0..6 {
            w.handle_key(Key::Enter);
        }
        assert_eq!(w.step(), Step::Confirm);
        let out = w.handle_key(Key::Char('y'));
        assert_eq!(out, Outcome::Issue(Command::Update { ticket: 8, spec: AppSpec::from_application(&app) }));
        assert!(matches!(w.on_done(Ok(())), Outcome::Close(Some(msg)) if msg == "updated web"));
    }

    #[test]
    fn submit_failure_stays_open_for_retry() {
        let app = Application {
            name: "web".into(),
            project: "p".into(),
            repo_url: "r".into(),
            path: "p".into(),
            revision: "main".into(),
            cluster: "c".into(),
            namespace: "n".into(),
            ..Default::default()
        };
        let (mut w, _) = Wizard::edit(1, &app);
        w.on_choices(None, Ok(Vec::new()), Ok(Vec::new()));
        for _ in 0..6 {
            w.handle_key(Key::Enter);
        }
        w.handle_key(Key::Char('y'));
        assert_eq!(w.on_done(Err(ApiError::Internal("conflict".into()))), Outcome::Stay);
        assert!(!w.submitting);
        assert!(matches!(w.handle_key(Key::Char('y')), Outcome::Issue(Command::Update { .. })));
    }

    #[test]
    fn cancel_from_any_step() {
        let mut w = loaded_create();
        type_str(&mut w, "x");
        w.handle_key(Key::Enter);
        assert!(matches!(w.handle_key(Key::Esc), Outcome::Close(_)));
    }

    #[test]
    fn edit_keeps_values_missing_from_lists() {
        let app = Application {
            name: "web".into(),
            project: "platform".into(),
            repo_url: "https://git/unregistered".into(),
            path: "k8s".into(),
            revision: String::new(),
            cluster: "https://other-cluster".into(),
            namespace: "web".into(),
            ..Default::default()
        };
        let (mut w, _) = Wizard::edit(4, &app);
        w.on_choices(None, Ok(vec!["https://git/a".into()]), Ok(vec!["https://kubernetes.default.svc".into()]));
        assert_eq!(w.options()[0], "https://git/unregistered");
        assert_eq!(w.cursor, 0);
        for _ in 0..6 {
            w.handle_key(Key::Enter);
        }
        assert_eq!(w.step(), Step::Confirm);
        assert_eq!(w.spec.repo_url, "https://git/unregistered");
        assert_eq!(w.spec.cluster, "https://other-cluster");
        assert_eq!(w.spec.revision, "main");
        let Outcome::Issue(Command::Update { spec, .. }) = w.handle_key(Key::Char('y')) else {
            panic!("expected update");
        };
        assert_eq!(spec.project, "platform");
        assert_eq!(spec.repo_url, "https://git/unregistered");
    }

    #[test]
    fn create_lists_are_not_padded() {
        let w = loaded_create();
        assert_eq!(w.choices.projects, vec!["default", "platform"]);
        assert_eq!(w.choices.repositories.len(), 2);
    }
}
