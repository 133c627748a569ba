//! OpenAPI document assembled at runtime from API models and route groups.
//!
//! Every entity contributes one component schema named after the entity and
//! two path items, the collection and the item path. Errors share the
//! `Error` component.

use crate::config::ApiConfig;
use crate::routes::{Operation, RouteGroup};
use crate::schema::{ApiField, ApiModel};
use crate::types::WireType;
use utoipa::openapi::path::{OperationBuilder, ParameterBuilder, ParameterIn};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::schema::SchemaType;
use utoipa::openapi::{
    ArrayBuilder, ComponentsBuilder, Content, HttpMethod, InfoBuilder, ObjectBuilder, OpenApi,
    OpenApiBuilder, PathItem, PathsBuilder, Ref, RefOr, Required, ResponseBuilder, Schema,
    SchemaFormat, Type,
};

const ERROR_SCHEMA: &str = "Error";
const JSON: &str = "application/json";

fn format_of(wire_type: &WireType) -> Option<&'static str> {
    match wire_type {
        WireType::Date => Some("date"),
        WireType::DateTime => Some("date-time"),
        WireType::Binary => Some("byte"),
        _ => None,
    }
}

fn schema_type(base: Type, nullable: bool) -> SchemaType {
    if nullable {
        SchemaType::from_iter([base, Type::Null])
    } else {
        SchemaType::new(base)
    }
}

fn wire_schema(wire_type: &WireType, format: Option<&str>, nullable: bool) -> ObjectOrArray {
    let scalar = |base: Type| {
        ObjectBuilder::new()
            .schema_type(schema_type(base, nullable))
            .format(
                format
                    .or_else(|| format_of(wire_type))
                    .map(|f| SchemaFormat::Custom(f.to_owned())),
            )
    };
    match wire_type {
        WireType::Integer => ObjectOrArray::Object(scalar(Type::Integer)),
        WireType::Number => ObjectOrArray::Object(scalar(Type::Number)),
        WireType::Boolean => ObjectOrArray::Object(scalar(Type::Boolean)),
        WireType::String | WireType::Date | WireType::DateTime | WireType::Binary => {
            ObjectOrArray::Object(scalar(Type::String))
        }
        WireType::Object => ObjectOrArray::Object(scalar(Type::Object)),
        WireType::Enum(values) => {
            ObjectOrArray::Object(scalar(Type::String).enum_values(Some(values.iter().cloned())))
        }
        WireType::Array(inner) => {
            let items: RefOr<Schema> = wire_schema(inner, None, false).into();
            ObjectOrArray::Array(
                ArrayBuilder::new()
                    .schema_type(schema_type(Type::Array, nullable))
                    .items(items),
            )
        }
    }
}

enum ObjectOrArray {
    Object(ObjectBuilder),
    Array(ArrayBuilder),
}

impl ObjectOrArray {
    fn read_only(self, read_only: bool) -> Self {
        let flag = read_only.then_some(true);
        match self {
            Self::Object(object) => Self::Object(object.read_only(flag)),
            // Arrays carry no readOnly keyword in utoipa's builder.
            array @ Self::Array(_) => array,
        }
    }

    fn description(self, description: Option<&str>) -> Self {
        match self {
            Self::Object(object) => Self::Object(object.description(description)),
            Self::Array(array) => Self::Array(array.description(description)),
        }
    }

    fn max_length(self, max_length: Option<u32>) -> Self {
        match self {
            Self::Object(object) => Self::Object(
                object.max_length(max_length.and_then(|n| usize::try_from(n).ok())),
            ),
            array @ Self::Array(_) => array,
        }
    }
}

impl From<ObjectOrArray> for RefOr<Schema> {
    fn from(schema: ObjectOrArray) -> Self {
        match schema {
            ObjectOrArray::Object(object) => object.into(),
            ObjectOrArray::Array(array) => RefOr::T(Schema::Array(array.build())),
        }
    }
}

fn field_schema(field: &ApiField) -> RefOr<Schema> {
    let description = field
        .client_assigned
        .then_some("Primary key chosen by the client: required on create, fixed afterwards");
    wire_schema(&field.wire_type, field.format, field.nullable)
        .read_only(field.read_only && !field.client_assigned)
        .description(description)
        .max_length(field.max_length)
        .into()
}

/// Component schema of one API model.
#[must_use]
pub fn model_schema(model: &ApiModel) -> RefOr<Schema> {
    let mut object = ObjectBuilder::new().schema_type(Type::Object);
    for field in model.fields() {
        object = object.property(&field.name, field_schema(field));
    }
    for field in model.create_fields() {
        object = object.required(&field.name);
    }
    object.into()
}

fn error_schema() -> RefOr<Schema> {
    ObjectBuilder::new()
        .schema_type(Type::Object)
        .property("error", ObjectBuilder::new().schema_type(Type::String))
        .property(
            "details",
            ArrayBuilder::new().items(ObjectBuilder::new().schema_type(Type::String)),
        )
        .required("error")
        .into()
}

fn json_response(description: &str, schema: impl Into<RefOr<Schema>>) -> ResponseBuilder {
    ResponseBuilder::new()
        .description(description)
        .content(JSON, Content::new(Some(schema)))
}

fn error_response(description: &str) -> ResponseBuilder {
    json_response(description, Ref::from_schema_name(ERROR_SCHEMA))
}

fn http_method(operation: Operation) -> HttpMethod {
    match operation {
        Operation::List | Operation::Retrieve => HttpMethod::Get,
        Operation::Create => HttpMethod::Post,
        Operation::Update => HttpMethod::Put,
        Operation::Delete => HttpMethod::Delete,
    }
}

fn operation(group: &RouteGroup, model: &ApiModel, op: Operation) -> OperationBuilder {
    let entity = model.entity_name();
    let model_ref = || Ref::from_schema_name(entity);
    let body = || {
        RequestBodyBuilder::new()
            .required(Some(Required::True))
            .content(JSON, Content::new(Some(model_ref())))
            .build()
    };
    let key_parameter = || {
        let key = model.read_only_fields().next();
        ParameterBuilder::new()
            .name("id")
            .parameter_in(ParameterIn::Path)
            .required(Required::True)
            .schema(key.map(|field| {
                RefOr::from(wire_schema(&field.wire_type, field.format, false))
            }))
            .build()
    };
    let success = op.success().as_u16().to_string();

    let builder = OperationBuilder::new()
        .tag(entity)
        .operation_id(Some(format!("{op}_{}", group.prefix())));
    match op {
        Operation::List => builder
            .summary(Some(format!("List {entity} records")))
            .parameter(
                ParameterBuilder::new()
                    .name("range")
                    .parameter_in(ParameterIn::Query)
                    .required(Required::False)
                    .description(Some("JSON array [start, end] of inclusive row indices"))
                    .schema(Some(ObjectBuilder::new().schema_type(Type::String)))
                    .build(),
            )
            .response(
                success,
                json_response(
                    &format!("{entity} records ordered by primary key"),
                    ArrayBuilder::new().items(model_ref()),
                ),
            )
            .response("400", error_response("Malformed range")),
        Operation::Create => builder
            .summary(Some(format!("Create a {entity}")))
            .request_body(Some(body()))
            .response(success, json_response(&format!("The created {entity}"), model_ref()))
            .response("400", error_response("Invalid payload"))
            .response("409", error_response("Constraint violation")),
        Operation::Retrieve => builder
            .summary(Some(format!("Get one {entity}")))
            .parameter(key_parameter())
            .response(success, json_response(&format!("The {entity}"), model_ref()))
            .response("404", error_response("Not found")),
        Operation::Update => builder
            .summary(Some(format!("Update fields of one {entity}")))
            .parameter(key_parameter())
            .request_body(Some(body()))
            .response(success, json_response(&format!("The updated {entity}"), model_ref()))
            .response("400", error_response("Invalid payload"))
            .response("404", error_response("Not found"))
            .response("409", error_response("Constraint violation")),
        Operation::Delete => builder
            .summary(Some(format!("Delete one {entity}")))
            .parameter(key_parameter())
            .response(success, ResponseBuilder::new().description("Deleted"))
            .response("404", error_response("Not found"))
            .response("409", error_response("Still referenced")),
    }
}

/// OpenAPI document covering every route group.
#[must_use]
pub fn document<'a>(
    config: &ApiConfig,
    groups: impl IntoIterator<Item = (&'a RouteGroup, &'a ApiModel)>,
) -> OpenApi {
    let mut paths = PathsBuilder::new();
    let mut components = ComponentsBuilder::new().schema(ERROR_SCHEMA, error_schema());

    for (group, model) in groups {
        components = components.schema(model.entity_name(), model_schema(model));

        let mut collection: Option<PathItem> = None;
        let mut item: Option<PathItem> = None;
        for binding in group.operations() {
            let op = binding.operation;
            let target = if op.is_item() { &mut item } else { &mut collection };
            let built = operation(group, model, op);
            *target = Some(match target.take() {
                Some(path_item) => {
                    let mut merged = path_item;
                    merged.merge_operations(PathItem::new(http_method(op), built));
                    merged
                }
                None => PathItem::new(http_method(op), built),
            });
        }

        if let Some(collection) = collection {
            paths = paths.path(group.url_prefix(), collection);
        }
        if let Some(item) = item {
            paths = paths.path(format!("{}/{{id}}", group.url_prefix()), item);
        }
    }

    OpenApiBuilder::new()
        .info(
            InfoBuilder::new()
                .title(config.title.as_str())
                .version(config.version.as_str())
                .description(config.description.as_deref()),
        )
        .paths(paths)
        .components(Some(components.build()))
        .build()
}
