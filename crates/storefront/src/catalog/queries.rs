//! GROQ queries.
//!
//! Every product query projects onto the same shape so results deserialize
//! into [`super::Product`].

macro_rules! product_projection {
    () => {
        r#"{
  "id": _id,
  name,
  "slug": slug.current,
  price,
  description,
  "images": coalesce(images[].asset->url, []),
  "category": category->slug.current,
  "sizes": coalesce(sizes, []),
  "colors": coalesce(colors, []),
  weight
}"#
    };
}

pub const LIST_PRODUCTS: &str = concat!(
    r#"*[_type == "product" && (!defined($category) || category->slug.current == $category)] | order(name asc) "#,
    product_projection!()
);

pub const PRODUCT_BY_SLUG: &str = concat!(
    r#"*[_type == "product" && slug.current == $slug][0] "#,
    product_projection!()
);

pub const SEARCH_PRODUCTS: &str = concat!(
    r#"*[_type == "product" && (name match $term || description match $term)] | order(name asc) "#,
    product_projection!()
);

pub const CATEGORIES: &str =
    r#"*[_type == "category"] | order(title asc) { "id": _id, title, "slug": slug.current }"#;
