//! Retained view model for the two dashboard panels.
//!
//! Rendering never touches pixels directly: the renderer clears containers and
//! appends `Element`s, and the dashboard paints whatever the containers hold
//! on the next frame.

/// One card in a panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Classifier tokens, resolved to colours by the theme.
    pub classes: Vec<String>,
    pub title: String,
    pub lines: Vec<Line>,
}

impl Element {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            classes: Vec::new(),
            title: title.into(),
            lines: Vec::new(),
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_line(mut self, label: &str, value: impl Into<String>) -> Self {
        self.lines.push(Line {
            label: label.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Space-separated class list, as a stylesheet would see it.
    pub fn class_name(&self) -> String {
        self.classes.join(" ")
    }

    /// Value of the first line with the given label.
    pub fn line(&self, label: &str) -> Option<&str> {
        self.lines
            .iter()
            .find(|l| l.label == label)
            .map(|l| l.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub label: String,
    pub value: String,
}

impl Line {
    pub fn text(&self) -> String {
        format!("{}: {}", self.label, self.value)
    }
}

/// A view node that can be emptied and appended to.
pub trait Container {
    fn id(&self) -> &str;
    fn clear(&mut self);
    fn append_child(&mut self, element: Element);
    fn children(&self) -> &[Element];
}

/// Looks up containers by their stable identifier.
pub trait ViewBinding {
    fn container(&mut self, id: &str) -> Option<&mut dyn Container>;
}

/// In-memory container.
#[derive(Debug, Clone, Default)]
pub struct Panel {
    id: String,
    children: Vec<Element>,
}

impl Panel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
        }
    }
}

impl Container for Panel {
    fn id(&self) -> &str {
        &self.id
    }

    fn clear(&mut self) {
        self.children.clear();
    }

    fn append_child(&mut self, element: Element) {
        self.children.push(element);
    }

    fn children(&self) -> &[Element] {
        &self.children
    }
}

/// The dashboard surface: the queue panel and the agent roster.
#[derive(Debug, Clone)]
pub struct Panels {
    pub queue: Panel,
    pub agents: Panel,
}

impl Panels {
    pub fn new(queue_id: &str, agents_id: &str) -> Self {
        Self {
            queue: Panel::new(queue_id),
            agents: Panel::new(agents_id),
        }
    }
}

impl ViewBinding for Panels {
    fn container(&mut self, id: &str) -> Option<&mut dyn Container> {
        if self.queue.id == id {
            Some(&mut self.queue)
        } else if self.agents.id == id {
            Some(&mut self.agents)
        } else {
            None
        }
    }
}
