//! Recursive-descent parser for Thrift IDL documents.

use std::collections::HashSet;

use crate::ast::{
    Document, EnumDef, FieldDef, FieldType, FunctionDef, Requiredness, ServiceDef, StructDef,
    StructKind, TypedefDef,
};
use crate::error::IdlError;
use crate::lexer::{tokenize, Spanned, Token};

/// Parse `source` as the document for module `name`.
///
/// `file` is used in error messages only.
pub fn parse_document(name: &str, file: &str, source: &str) -> Result<Document, IdlError> {
    let tokens = tokenize(file, source)?;
    let mut parser = Parser {
        file,
        tokens,
        pos: 0,
        doc: None,
    };
    let mut document = Document {
        name: name.to_string(),
        ..Document::default()
    };
    while !parser.at_eof() {
        parser.definition(&mut document)?;
    }
    Ok(document)
}

struct Parser<'a> {
    file: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
    /// Most recent doc comment not yet claimed by a definition.
    doc: Option<String>,
}

type ParseResult<T> = Result<T, IdlError>;

impl Parser<'_> {
    /// Skip doc comments, remembering the last one.
    fn skip_docs(&mut self) {
        while let Token::Doc(text) = &self.tokens[self.pos].token {
            self.doc = Some(text.clone());
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> &Token {
        self.skip_docs();
        &self.tokens[self.pos].token
    }

    fn line(&mut self) -> usize {
        self.skip_docs();
        self.tokens[self.pos].line
    }

    fn next(&mut self) -> Token {
        self.skip_docs();
        let token = self.tokens[self.pos].token.clone();
        if token != Token::Eof {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&mut self) -> bool {
        *self.peek() == Token::Eof
    }

    fn take_doc(&mut self) -> Option<String> {
        self.skip_docs();
        self.doc.take()
    }

    fn error<T>(&mut self, message: impl Into<String>) -> ParseResult<T> {
        Err(IdlError::Parse {
            file: self.file.to_string(),
            line: self.line(),
            message: message.into(),
        })
    }

    fn unexpected<T>(&mut self, expected: &str) -> ParseResult<T> {
        let found = self.peek().describe();
        self.error(format!("expected {}, found {}", expected, found))
    }

    fn is_punct(&mut self, c: char) -> bool {
        *self.peek() == Token::Punct(c)
    }

    fn is_keyword(&mut self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s == keyword)
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.is_punct(c) {
            self.next();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.next();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> ParseResult<()> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            self.unexpected(&format!("'{}'", c))
        }
    }

    fn ident(&mut self) -> ParseResult<String> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.next();
                Ok(name)
            }
            _ => self.unexpected("identifier"),
        }
    }

    fn string_literal(&mut self) -> ParseResult<String> {
        match self.peek().clone() {
            Token::Str(value) => {
                self.next();
                Ok(value)
            }
            _ => self.unexpected("string literal"),
        }
    }

    fn int_literal(&mut self) -> ParseResult<i64> {
        let token = self.peek().clone();
        match token {
            Token::Int(value) => {
                self.next();
                Ok(value)
            }
            _ => self.unexpected("integer"),
        }
    }

    fn list_separator(&mut self) {
        if !self.eat_punct(',') {
            self.eat_punct(';');
        }
    }

    /// Skip `( key = "value", ... )` if present.
    fn annotations(&mut self) -> ParseResult<()> {
        if !self.eat_punct('(') {
            return Ok(());
        }
        while !self.eat_punct(')') {
            self.ident()?;
            if self.eat_punct('=') {
                self.string_literal()?;
            }
            self.list_separator();
        }
        Ok(())
    }

    fn definition(&mut self, document: &mut Document) -> ParseResult<()> {
        let doc = self.take_doc();
        let keyword = self.ident()?;
        match keyword.as_str() {
            "include" => {
                let path = self.string_literal()?;
                document.includes.push(path);
            }
            "cpp_include" => {
                self.string_literal()?;
            }
            "namespace" => {
                self.namespace()?;
            }
            "typedef" => {
                let ty = self.field_type()?;
                let name = self.ident()?;
                self.annotations()?;
                self.list_separator();
                document.typedefs.push(TypedefDef { name, ty });
            }
            "const" => {
                self.field_type()?;
                self.ident()?;
                self.expect_punct('=')?;
                self.const_value()?;
                self.list_separator();
            }
            "enum" => document.enums.push(self.enum_body()?),
            "senum" => self.skip_block()?,
            "struct" => document.structs.push(self.struct_body(StructKind::Struct, doc)?),
            "union" => document.structs.push(self.struct_body(StructKind::Union, doc)?),
            "exception" => document
                .structs
                .push(self.struct_body(StructKind::Exception, doc)?),
            "service" => document.services.push(self.service_body(doc)?),
            other => {
                let message = format!("unknown definition keyword '{}'", other);
                return self.error(message);
            }
        }
        Ok(())
    }

    fn namespace(&mut self) -> ParseResult<()> {
        if self.eat_punct('*') {
            self.ident()?;
            return Ok(());
        }
        self.ident()?;
        if matches!(self.peek(), Token::Ident(_) | Token::Str(_)) {
            self.next();
            self.annotations()
        } else {
            self.unexpected("namespace name")
        }
    }

    fn skip_block(&mut self) -> ParseResult<()> {
        self.ident()?;
        self.expect_punct('{')?;
        while !self.eat_punct('}') {
            if self.next() == Token::Eof {
                return self.unexpected("'}'");
            }
        }
        Ok(())
    }

    fn enum_body(&mut self) -> ParseResult<EnumDef> {
        let name = self.ident()?;
        self.expect_punct('{')?;
        let mut values = Vec::new();
        let mut next_value: i64 = 0;
        while !self.eat_punct('}') {
            let variant = self.ident()?;
            let value = if self.eat_punct('=') {
                self.int_literal()?
            } else {
                next_value
            };
            let Ok(value) = i32::try_from(value) else {
                return self.error(format!("enum value {} out of range", value));
            };
            next_value = i64::from(value) + 1;
            self.annotations()?;
            self.list_separator();
            values.push((variant, value));
        }
        self.annotations()?;
        Ok(EnumDef { name, values })
    }

    fn struct_body(&mut self, kind: StructKind, doc: Option<String>) -> ParseResult<StructDef> {
        let name = self.ident()?;
        self.eat_keyword("xsd_all");
        self.expect_punct('{')?;
        let fields = self.field_list('}')?;
        self.annotations()?;
        Ok(StructDef {
            kind,
            name,
            fields,
            doc,
        })
    }

    fn service_body(&mut self, doc: Option<String>) -> ParseResult<ServiceDef> {
        let name = self.ident()?;
        let extends = if self.eat_keyword("extends") {
            Some(self.ident()?)
        } else {
            None
        };
        self.expect_punct('{')?;
        let mut functions: Vec<FunctionDef> = Vec::new();
        while !self.eat_punct('}') {
            let function = self.function()?;
            if functions.iter().any(|f| f.name == function.name) {
                let message = format!(
                    "function '{}' defined twice in service '{}'",
                    function.name, name
                );
                return self.error(message);
            }
            functions.push(function);
        }
        self.annotations()?;
        Ok(ServiceDef {
            name,
            extends,
            functions,
            doc,
        })
    }

    fn function(&mut self) -> ParseResult<FunctionDef> {
        let doc = self.take_doc();
        let oneway = self.eat_keyword("oneway") || self.eat_keyword("async");
        let returns = if self.eat_keyword("void") {
            None
        } else {
            Some(self.field_type()?)
        };
        let name = self.ident()?;
        self.expect_punct('(')?;
        let args = self.field_list(')')?;
        let throws = if self.eat_keyword("throws") {
            self.expect_punct('(')?;
            self.field_list(')')?
        } else {
            Vec::new()
        };
        self.annotations()?;
        self.list_separator();

        if oneway && (returns.is_some() || !throws.is_empty()) {
            return self.error(format!(
                "oneway function '{}' must return void and throw nothing",
                name
            ));
        }

        Ok(FunctionDef {
            name,
            oneway,
            returns,
            args,
            throws,
            doc,
        })
    }

    /// Parse fields up to and including `close`.
    fn field_list(&mut self, close: char) -> ParseResult<Vec<FieldDef>> {
        let mut fields: Vec<FieldDef> = Vec::new();
        let mut seen = HashSet::new();
        let mut next_implicit: i16 = -1;
        while !self.eat_punct(close) {
            // Field docs are not kept.
            self.take_doc();
            let field = self.field(&mut next_implicit)?;
            if !seen.insert(field.id) {
                let message = format!("duplicate field id {} for '{}'", field.id, field.name);
                return self.error(message);
            }
            fields.push(field);
        }
        Ok(fields)
    }

    fn field(&mut self, next_implicit: &mut i16) -> ParseResult<FieldDef> {
        let token = self.peek().clone();
        let (id, explicit_id) = if let Token::Int(value) = token {
            self.next();
            self.expect_punct(':')?;
            let Ok(id) = i16::try_from(value) else {
                return self.error(format!("field id {} out of range", value));
            };
            (id, true)
        } else {
            let id = *next_implicit;
            *next_implicit -= 1;
            (id, false)
        };

        let requiredness = if self.eat_keyword("required") {
            Requiredness::Required
        } else if self.eat_keyword("optional") {
            Requiredness::Optional
        } else {
            Requiredness::Default
        };

        let ty = self.field_type()?;
        let name = self.ident()?;
        if self.eat_punct('=') {
            self.const_value()?;
        }
        self.annotations()?;
        self.list_separator();

        Ok(FieldDef {
            id,
            explicit_id,
            name,
            ty,
            requiredness,
        })
    }

    fn field_type(&mut self) -> ParseResult<FieldType> {
        let name = self.ident()?;
        let ty = match name.as_str() {
            "list" | "set" => {
                self.cpp_type()?;
                self.expect_punct('<')?;
                let elem = Box::new(self.field_type()?);
                self.expect_punct('>')?;
                if name == "list" {
                    FieldType::List(elem)
                } else {
                    FieldType::Set(elem)
                }
            }
            "map" => {
                self.cpp_type()?;
                self.expect_punct('<')?;
                let key = Box::new(self.field_type()?);
                self.expect_punct(',')?;
                let value = Box::new(self.field_type()?);
                self.expect_punct('>')?;
                FieldType::Map(key, value)
            }
            other => FieldType::base(other).unwrap_or_else(|| FieldType::Named(name.clone())),
        };
        self.annotations()?;
        Ok(ty)
    }

    fn cpp_type(&mut self) -> ParseResult<()> {
        if self.eat_keyword("cpp_type") {
            self.string_literal()?;
        }
        Ok(())
    }

    /// Parse and discard a constant value.
    fn const_value(&mut self) -> ParseResult<()> {
        let token = self.peek().clone();
        match token {
            Token::Int(_) | Token::Double(_) | Token::Str(_) | Token::Ident(_) => {
                self.next();
                Ok(())
            }
            Token::Punct('[') => {
                self.next();
                while !self.eat_punct(']') {
                    self.const_value()?;
                    self.list_separator();
                }
                Ok(())
            }
            Token::Punct('{') => {
                self.next();
                while !self.eat_punct('}') {
                    self.const_value()?;
                    self.expect_punct(':')?;
                    self.const_value()?;
                    self.list_separator();
                }
                Ok(())
            }
            _ => self.unexpected("constant value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Document {
        parse_document("test", "test.thrift", source).unwrap()
    }

    fn parse_err(source: &str) -> String {
        parse_document("test", "test.thrift", source)
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn test_echo_service() {
        let doc = parse(
            r#"
            namespace py echo
            /** Echoes its input. */
            service Echo {
                /** Returns the message unchanged. */
                string echo(1: string message),
                oneway void ping()
            }
            "#,
        );

        let service = doc.service("Echo").unwrap();
        assert_eq!(service.doc.as_deref(), Some("Echoes its input."));
        assert_eq!(service.functions.len(), 2);

        let echo = &service.functions[0];
        assert_eq!(echo.name, "echo");
        assert_eq!(echo.returns, Some(FieldType::String));
        assert_eq!(echo.args[0].id, 1);
        assert_eq!(echo.args[0].name, "message");
        assert_eq!(echo.doc.as_deref(), Some("Returns the message unchanged."));
        assert_eq!(echo.signature(), "string echo(1: string message)");

        let ping = &service.functions[1];
        assert!(ping.oneway);
        assert_eq!(ping.returns, None);
        assert!(ping.doc.is_none());
    }

    #[test]
    fn test_structs_enums_typedefs_consts() {
        let doc = parse(
            r#"
            include "shared.thrift"
            const i32 LIMIT = 10
            const map<string, list<i32>> TABLE = { "a": [1, 2], "b": [] };
            typedef i64 UserId
            enum Color { RED, GREEN = 5, BLUE }
            struct User {
                1: required UserId id
                2: optional string name = "anon" (deprecated = "true")
                3: list<Color> colors;
            }
            union Key { 1: i64 id, 2: string name }
            exception NotFound { 1: string what }
            "#,
        );

        assert_eq!(doc.includes, vec!["shared.thrift".to_string()]);
        assert_eq!(doc.typedef("UserId").unwrap().ty, FieldType::I64);
        assert_eq!(
            doc.enum_def("Color").unwrap().values,
            vec![
                ("RED".to_string(), 0),
                ("GREEN".to_string(), 5),
                ("BLUE".to_string(), 6)
            ]
        );

        let user = doc.struct_def("User").unwrap();
        assert_eq!(user.kind, StructKind::Struct);
        assert_eq!(user.fields[0].requiredness, Requiredness::Required);
        assert_eq!(user.fields[1].requiredness, Requiredness::Optional);
        assert_eq!(
            user.fields[2].ty,
            FieldType::List(Box::new(FieldType::Named("Color".to_string())))
        );
        assert_eq!(doc.struct_def("Key").unwrap().kind, StructKind::Union);
        assert_eq!(doc.struct_def("NotFound").unwrap().kind, StructKind::Exception);
    }

    #[test]
    fn test_implicit_field_ids_count_down() {
        let doc = parse("struct S { string a, 4: string b, string c }");
        let ids: Vec<_> = doc.structs[0].fields.iter().map(|f| (f.id, f.explicit_id)).collect();
        assert_eq!(ids, vec![(-1, false), (4, true), (-2, false)]);
    }

    #[test]
    fn test_extends_and_throws() {
        let doc = parse(
            r#"
            service Child extends shared.Base {
                i32 get(1: string key) throws (1: NotFound nf, 2: shared.Oops oops)
            }
            "#,
        );
        let service = doc.service("Child").unwrap();
        assert_eq!(service.extends.as_deref(), Some("shared.Base"));
        assert_eq!(service.functions[0].throws.len(), 2);
        assert_eq!(
            service.functions[0].throws[1].ty,
            FieldType::Named("shared.Oops".to_string())
        );
    }

    #[test]
    fn test_errors_report_line() {
        assert_eq!(
            parse_err("service S {\n  string f(1: string a\n}"),
            "test.thrift:3: expected identifier, found '}'"
        );
        assert_eq!(
            parse_err("struct S { 1: i32 a, 1: i32 b }"),
            "test.thrift:1: duplicate field id 1 for 'b'"
        );
        assert_eq!(
            parse_err("service S { i32 f() i32 f() }"),
            "test.thrift:1: function 'f' defined twice in service 'S'"
        );
        assert!(parse_err("oops").contains("unknown definition keyword 'oops'"));
        assert!(parse_err("service S { oneway i32 f() }").contains("must return void"));
    }
}
