//! Handler for `<xsl:number>`.

use crate::ast::{AttributeValueTemplate, Instruction, NumberInstruction};
use crate::compiler::CompilerBuilder;
use crate::error::XsltError;
use crate::numbering::{LetterValue, NumberLevel};
use weft_tree::Node;

impl CompilerBuilder {
    pub(crate) fn compile_number(&mut self, node: &Node) -> Result<Instruction, XsltError> {
        let level = match self.attr(node, "level").as_deref().map(str::trim) {
            None | Some("single") => NumberLevel::Single,
            Some("multiple") => NumberLevel::Multiple,
            Some("any") => NumberLevel::Any,
            Some(other) => {
                return Err(XsltError::structure(
                    format!("invalid xsl:number level '{}'", other),
                    node.line_number(),
                ));
            }
        };
        let count = match self.attr(node, "count") {
            Some(text) => Some(self.pattern(node, &text)?),
            None => None,
        };
        let from = match self.attr(node, "from") {
            Some(text) => Some(self.pattern(node, &text)?),
            None => None,
        };
        let value = match self.attr(node, "value") {
            Some(text) => Some(self.expression(node, &text)?),
            None => None,
        };
        let format = self.avt(node, self.attr(node, "format").as_deref().unwrap_or("1"))?;
        let letter_value = self.optional_avt(node, "letter-value")?;
        if let Some(AttributeValueTemplate::Static(text)) = &letter_value {
            text.parse::<LetterValue>()
                .map_err(|message| XsltError::structure(message, node.line_number()))?;
        }
        let grouping_size = self.optional_avt(node, "grouping-size")?;
        if let Some(AttributeValueTemplate::Static(text)) = &grouping_size {
            if text.trim().parse::<usize>().is_err() {
                return Err(XsltError::structure(
                    format!("grouping-size must be a whole number, not '{}'", text),
                    node.line_number(),
                ));
            }
        }
        Ok(Instruction::Number(Box::new(NumberInstruction {
            level,
            count,
            from,
            value,
            format,
            grouping_separator: self.optional_avt(node, "grouping-separator")?,
            grouping_size,
            letter_value,
            lang: self.optional_avt(node, "lang")?,
            line: node.line_number(),
        })))
    }

    fn optional_avt(&self, node: &Node, local: &str) -> Result<Option<AttributeValueTemplate>, XsltError> {
        match self.attr(node, local) {
            Some(text) => Ok(Some(self.avt(node, &text)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{AttributeValueTemplate, Instruction};
    use crate::compiler::CompilerBuilder;
    use crate::error::XsltError;
    use crate::numbering::NumberLevel;
    use crate::resolver::MapResolver;
    use std::sync::Arc;
    use weft_tree::{NamePool, parse_document};

    fn compile_number(attributes: &str) -> Result<Instruction, XsltError> {
        let pool = NamePool::new();
        let text = format!(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform"><xsl:template match="/"><xsl:number {}/></xsl:template></xsl:stylesheet>"#,
            attributes
        );
        let doc = parse_document(&text, &pool)?;
        let mut sheet = CompilerBuilder::new(pool, Arc::new(MapResolver::new())).compile(&doc, None)?;
        Ok(sheet.templates.swap_remove(0).body.remove(0))
    }

    #[test]
    fn test_defaults() {
        let Instruction::Number(number) = compile_number("").unwrap() else {
            panic!("expected xsl:number");
        };
        assert_eq!(number.level, NumberLevel::Single);
        assert!(number.count.is_none() && number.from.is_none() && number.value.is_none());
        assert!(matches!(&number.format, AttributeValueTemplate::Static(f) if f == "1"));
    }

    #[test]
    fn test_patterns_and_templates() {
        let Instruction::Number(number) =
            compile_number(r#"level="multiple" count="chapter|section" from="book" format="{@style}""#).unwrap()
        else {
            panic!("expected xsl:number");
        };
        assert_eq!(number.level, NumberLevel::Multiple);
        assert!(number.count.is_some() && number.from.is_some());
        assert!(matches!(number.format, AttributeValueTemplate::Dynamic(_)));
    }

    #[test]
    fn test_invalid_attributes() {
        for attributes in [
            r#"level="all""#,
            r#"letter-value="numeric""#,
            r#"grouping-size="three""#,
            r#"count="[""#,
        ] {
            assert!(
                matches!(compile_number(attributes), Err(XsltError::Structure { .. })),
                "{} should be rejected",
                attributes
            );
        }
    }
}
