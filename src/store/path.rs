//! Entry identity.
//!
//! An [`EntryPath`] is the structured form of an entry's dot path. It is
//! kept canonical so that two paths naming the same on-disk prefix compare
//! equal:
//! - a container marker is never followed by a child step (the child of a
//!   container and the child of the matching leaf live in the same place)
//! - the root is already a container, so it never carries a marker
//! - two container markers never follow each other

/// One hop from the store root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    /// A named child.
    Child(String),
    /// The container view of the entry built so far.
    Dir,
    /// The metadata subtree of the entry built so far.
    Meta,
}

/// Structured identity of an entry, relative to the store root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EntryPath {
    steps: Vec<Step>,
}

impl EntryPath {
    /// The store root.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// True for the container view of an entry. The root is a container.
    pub fn is_container(&self) -> bool {
        matches!(self.steps.last(), None | Some(Step::Dir))
    }

    /// Depth of the entry: one per child name and one per metadata hop.
    pub fn level(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| !matches!(s, Step::Dir))
            .count()
    }

    /// Name of the last child step. Metadata roots and the store root have
    /// an empty name.
    pub fn name(&self) -> &str {
        for step in self.steps.iter().rev() {
            match step {
                Step::Dir => continue,
                Step::Child(name) => return name,
                Step::Meta => return "",
            }
        }
        ""
    }

    /// Resolve a relative, possibly multi-segment name.
    ///
    /// The name is cleaned first: empty and `.` segments vanish and `..`
    /// drops the previous segment without ever leaving `self`. A trailing
    /// `/` yields the container view of the last segment. Resolution always
    /// starts from the container view of `self`, so `child("")` is
    /// [`EntryPath::dir`].
    pub fn child(&self, name: &str) -> Self {
        let mut path = self.dir();

        let segments = clean(name);
        if segments.is_empty() {
            return path;
        }
        for segment in segments {
            path.push_child(segment.to_string());
        }
        if name.ends_with('/') {
            path.push_dir();
        }
        path
    }

    /// Direct child with a literal name, bypassing cleaning. Used for names
    /// read back from disk.
    pub(crate) fn literal_child(&self, name: String) -> Self {
        let mut path = self.clone();
        path.push_child(name);
        path
    }

    /// The metadata subtree rooted at this entry.
    pub fn parameters(&self) -> Self {
        let mut path = self.clone();
        path.steps.push(Step::Meta);
        path
    }

    /// Parent entry, or `None` at the root.
    ///
    /// A container view first drops its marker. Without `force` that leaf
    /// view of the same entry is the answer; with `force` the climb goes on
    /// one level. Climbing out of a child lands on the container view of
    /// the parent, climbing out of a metadata root lands on its owner.
    pub fn parent(&self, force: bool) -> Option<Self> {
        let mut steps = self.steps.clone();
        if steps.last() == Some(&Step::Dir) {
            steps.pop();
            if !force {
                return Some(Self { steps });
            }
        }

        match steps.pop()? {
            Step::Child(_) => {
                let mut parent = Self { steps };
                parent.push_dir();
                Some(parent)
            }
            Step::Meta | Step::Dir => Some(Self { steps }),
        }
    }

    /// Container view, same level and name.
    pub fn dir(&self) -> Self {
        let mut path = self.clone();
        path.push_dir();
        path
    }

    /// Leaf view, same level and name.
    pub fn file(&self) -> Self {
        let mut path = self.clone();
        if path.steps.last() == Some(&Step::Dir) {
            path.steps.pop();
        }
        path
    }

    /// Render the dot path below `root`, which must end with `/`.
    pub fn render(&self, root: &str) -> String {
        let mut out = String::from(root);
        for step in &self.steps {
            match step {
                Step::Child(name) => {
                    if !out.ends_with('/') {
                        out.push_str("dir/");
                    }
                    out.push_str(name);
                    out.push('.');
                }
                Step::Dir => {
                    if !out.ends_with('/') {
                        out.push_str("dir/");
                    }
                }
                Step::Meta => out.push_str("meta"),
            }
        }
        out
    }

    /// URL path of this entry as seen from `base`.
    ///
    /// Returns `None` when `self` is not below `base`. Metadata hops are not
    /// addressable by path, so the path of their owner is returned.
    pub fn url_path_under(&self, base: &EntryPath) -> Option<String> {
        let base = base.file();
        let rest = self.steps.strip_prefix(base.steps.as_slice())?;

        let mut url = String::from("/");
        let mut container = false;
        for step in rest {
            match step {
                Step::Child(name) => {
                    if !url.ends_with('/') {
                        url.push('/');
                    }
                    url.push_str(name);
                    container = false;
                }
                Step::Dir => container = true,
                Step::Meta => break,
            }
        }
        if container && !url.ends_with('/') {
            url.push('/');
        }
        Some(url)
    }

    fn push_child(&mut self, name: String) {
        if self.steps.last() == Some(&Step::Dir) {
            self.steps.pop();
        }
        self.steps.push(Step::Child(name));
    }

    fn push_dir(&mut self) {
        if !self.is_container() {
            self.steps.push(Step::Dir);
        }
    }
}

fn clean(name: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    for segment in name.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments
}
