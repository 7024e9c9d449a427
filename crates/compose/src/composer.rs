use crate::bind::{BoundData, FieldValue};
use crate::error::{ComposeError, TemplateError};
use crate::source::TemplateSource;
use crate::template::{ElementDef, FieldKind, ImageDef, ParagraphDef, SectionDef, TableDef, TemplateDef};
use handlebars::{Handlebars, no_escape};
use log::debug;
use quire_model::{
    Column, DocumentMeta, DocumentTree, Image, LayoutHints, Node, Paragraph, Row, Section, Spacer,
    Table, TextRun, TextStyle,
};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Builds document trees from templates and input data.
///
/// Holds the template source and a Handlebars registry configured in strict
/// mode, so a placeholder naming an unknown field fails composition instead of
/// rendering as empty text. Escaping is disabled: output is a document tree,
/// not HTML.
pub struct Composer {
    source: Arc<dyn TemplateSource>,
    engine: Handlebars<'static>,
}

impl Composer {
    pub fn new(source: Arc<dyn TemplateSource>) -> Self {
        let mut engine = Handlebars::new();
        engine.set_strict_mode(true);
        engine.register_escape_fn(no_escape);
        Self { source, engine }
    }

    pub fn source(&self) -> &Arc<dyn TemplateSource> {
        &self.source
    }

    /// Composes `data` with the template registered as `template_id`.
    ///
    /// The same `(template_id, data)` pair always yields a structurally
    /// identical tree; nothing here reads the clock or any other ambient state.
    pub fn compose(&self, template_id: &str, data: &Value) -> Result<DocumentTree, ComposeError> {
        let template = self.source.get(template_id)?;
        let bound = BoundData::bind(&template, data)?;
        let scope = Scope {
            template: &template,
            bound: &bound,
            context: placeholder_context(&template, &bound)?,
            engine: &self.engine,
            base: template.base_style.apply(&TextStyle::default()),
        };

        let title = match &template.title {
            Some(title) => scope.render(title)?,
            None => template.id.clone(),
        };
        let creation_date = match &template.creation_date_field {
            Some(name) => match bound.scalars.get(name) {
                Some(FieldValue::Date(d)) => d.and_hms_opt(0, 0, 0),
                Some(FieldValue::Absent) => None,
                _ => {
                    return Err(TemplateError::Invalid {
                        id: template.id.clone(),
                        message: format!("creation date field '{}' is not a date field", name),
                    }
                    .into());
                }
            },
            None => None,
        };

        let mut tree = DocumentTree::new(
            DocumentMeta { title, author: None, creation_date },
            template.page,
        );
        tree.body = scope.elements(&template.body)?;
        tree.validate()?;

        debug!(
            "Composed '{}' into {} top-level nodes ({} tables)",
            template.id,
            tree.body.len(),
            tree.tables().len()
        );
        Ok(tree)
    }
}

/// Display strings for scalars, and formatted row objects for `rows` fields.
fn placeholder_context(template: &TemplateDef, bound: &BoundData) -> Result<Value, TemplateError> {
    let mut context = Map::new();
    for (name, shown) in &bound.display {
        context.insert(name.clone(), Value::String(shown.clone()));
    }
    for field in template.fields.iter().filter(|f| f.kind == FieldKind::Rows) {
        let rows = bound.rows.get(&field.name).map(Vec::as_slice).unwrap_or_default();
        let mut formatted = Vec::with_capacity(rows.len());
        for row in rows {
            let mut object = Map::new();
            for column in &field.columns {
                let shown = match row.get(&column.name) {
                    Some(value) => value.display(&column.format).map_err(|message| TemplateError::Invalid {
                        id: template.id.clone(),
                        message,
                    })?,
                    None => String::new(),
                };
                object.insert(column.name.clone(), Value::String(shown));
            }
            formatted.push(Value::Object(object));
        }
        context.insert(field.name.clone(), Value::Array(formatted));
    }
    Ok(Value::Object(context))
}

struct Scope<'a> {
    template: &'a TemplateDef,
    bound: &'a BoundData,
    context: Value,
    engine: &'a Handlebars<'static>,
    base: TextStyle,
}

impl Scope<'_> {
    fn render(&self, text: &str) -> Result<String, TemplateError> {
        if !text.contains("{{") {
            return Ok(text.to_string());
        }
        Ok(self.engine.render_template(text, &self.context)?)
    }

    fn style(&self, name: Option<&str>, over: &TextStyle) -> Result<TextStyle, TemplateError> {
        match name {
            None => Ok(over.clone()),
            Some(name) => self
                .template
                .styles
                .get(name)
                .map(|def| def.apply(over))
                .ok_or_else(|| TemplateError::UnknownStyle(name.to_string())),
        }
    }

    fn invalid(&self, message: String) -> TemplateError {
        TemplateError::Invalid { id: self.template.id.clone(), message }
    }

    fn elements(&self, elements: &[ElementDef]) -> Result<Vec<Node>, TemplateError> {
        let mut nodes = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                ElementDef::Paragraph(def) => nodes.push(self.paragraph(def)?.into()),
                ElementDef::Spacer { height } => nodes.push(Spacer { height: *height }.into()),
                ElementDef::Table(def) => nodes.extend(self.table(def)?),
                ElementDef::Image(def) => nodes.push(self.image(def)?.into()),
                ElementDef::Section(def) => nodes.push(self.section(def)?.into()),
            }
        }
        Ok(nodes)
    }

    fn paragraph(&self, def: &ParagraphDef) -> Result<Paragraph, TemplateError> {
        let style = self.style(def.style.as_deref(), &self.base)?;
        let mut runs = Vec::new();
        if let Some(text) = &def.text {
            runs.push(TextRun::new(self.render(text)?, style.clone()));
        }
        for run in &def.runs {
            runs.push(TextRun::new(
                self.render(&run.text)?,
                self.style(run.style.as_deref(), &style)?,
            ));
        }
        Ok(Paragraph {
            runs,
            align: def.align,
            space_after: def.space_after,
            hints: LayoutHints { page_break: def.page_break, repeat_header: false },
        })
    }

    fn table(&self, def: &TableDef) -> Result<Vec<Node>, TemplateError> {
        let field = self
            .template
            .field(&def.source)
            .filter(|f| f.kind == FieldKind::Rows)
            .ok_or_else(|| self.invalid(format!("table source '{}' is not a rows field", def.source)))?;

        let mut schema = Vec::with_capacity(def.columns.len());
        for column in &def.columns {
            let column_def = field
                .columns
                .iter()
                .find(|c| c.name == column.field)
                .ok_or_else(|| {
                    self.invalid(format!(
                        "table column '{}' is not a column of '{}'",
                        column.field, def.source
                    ))
                })?;
            schema.push(column_def);
        }

        let cell_style = self.style(def.cell_style.as_deref(), &self.base)?;
        let header_style = self.style(def.header_style.as_deref(), &cell_style)?;

        let mut header_texts = Vec::with_capacity(def.columns.len());
        for column in &def.columns {
            header_texts.push(self.render(&column.header)?);
        }

        let source_rows = self.bound.rows.get(&def.source).map(Vec::as_slice).unwrap_or_default();
        let mut rows = Vec::with_capacity(source_rows.len());
        for row in source_rows {
            let mut texts = Vec::with_capacity(schema.len());
            for column in &schema {
                let shown = match row.get(&column.name) {
                    Some(value) => value.display(&column.format).map_err(|m| self.invalid(m))?,
                    None => String::new(),
                };
                texts.push(shown);
            }
            rows.push(Row::from_texts(&texts, &cell_style));
        }

        let table = Table {
            columns: def.columns.iter().map(|c| Column::new(c.width, c.align)).collect(),
            header: Some(Row::from_texts(&header_texts, &header_style)),
            rows,
            style: def.table_style.clone(),
            hints: LayoutHints { page_break: def.page_break, repeat_header: def.repeat_header },
        };

        let mut nodes = Vec::with_capacity(2);
        let empty = table.rows.is_empty();
        nodes.push(Node::Table(table));
        if empty && let Some(text) = &def.empty_text {
            nodes.push(Paragraph::plain(self.render(text)?, cell_style.clone()).into());
        }
        Ok(nodes)
    }

    fn image(&self, def: &ImageDef) -> Result<Image, TemplateError> {
        Ok(Image {
            resource: self.render(&def.src)?,
            width: def.width,
            height: def.height,
            align: def.align,
            hints: LayoutHints { page_break: def.page_break, repeat_header: false },
        })
    }

    fn section(&self, def: &SectionDef) -> Result<Section, TemplateError> {
        let title = match &def.title {
            Some(text) => {
                let style = match def.title_style.as_deref() {
                    Some(name) => self.style(Some(name), &self.base)?,
                    None => {
                        let mut style = self.base.clone();
                        style.font = style.font.bold();
                        style.font.size += 2.0;
                        style
                    }
                };
                Some(Paragraph::plain(self.render(text)?, style).with_space_after(4.0))
            }
            None => None,
        };
        Ok(Section {
            title,
            children: self.elements(&def.children)?,
            hints: LayoutHints { page_break: def.page_break, repeat_header: false },
        })
    }
}
