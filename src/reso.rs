use tracing::{debug, info, warn};

use crate::client::{QueryParams, ResoApi};
use crate::error::{Error, Result};
use crate::helpers::{page_count, skiptoken_from_next_link};
use crate::listing_structs::{ListingRecord, ListingsContainer, PageResponse};
use crate::metadata::MetadataIndex;
use crate::substitution::LabelSubstitution;

pub(crate) const PROPERTY_PATH: &str = "/Property";
pub(crate) const METADATA_PATH: &str = "/$metadata";

/// What to ask `/Property` for on every request of one run.
#[derive(Debug, Clone)]
pub(crate) struct ListingQuery<'a> {
    pub(crate) filter: Option<&'a str>,
    pub(crate) page_size: u32,
    pub(crate) expand: &'a str,
    pub(crate) count_select: &'a str,
}

impl ListingQuery<'_> {
    fn count_params(&self) -> QueryParams {
        let mut params = vec![
            ("$top", "1".to_string()),
            ("$count", "true".to_string()),
        ];
        if let Some(filter) = self.filter {
            params.push(("$filter", filter.to_string()));
        }
        params.push(("$select", self.count_select.to_string()));
        params
    }

    fn page_params(&self, skiptoken: &str) -> QueryParams {
        let mut params = vec![("$top", self.page_size.to_string())];
        if let Some(filter) = self.filter {
            params.push(("$filter", filter.to_string()));
        }
        params.push(("$expand", self.expand.to_string()));
        params.push(("$skiptoken", skiptoken.to_string()));
        params
    }
}

pub(crate) async fn fetch_metadata<C: ResoApi + ?Sized>(client: &C) -> Result<MetadataIndex> {
    let xml = client.get_text(METADATA_PATH).await?;
    MetadataIndex::parse(&xml)
}

/// Small `$count` request so we know how many pages to ask for.
pub(crate) async fn count_listings<C: ResoApi + ?Sized>(client: &C, query: &ListingQuery<'_>) -> Result<u64> {
    let response = client.get(PROPERTY_PATH, &query.count_params()).await?;
    let counted: PageResponse = serde_json::from_value(response)?;
    let count = counted.count.ok_or(Error::MissingCount)?;

    info!("number_of_records: {}", count);
    Ok(count)
}

/// Pages through every listing matching `query`, swapping in readable labels
/// as each page arrives. Pages are kept in request order.
#[tracing::instrument(skip(client, engine))]
pub(crate) async fn fetch_all<C: ResoApi + ?Sized>(
    client: &C,
    query: &ListingQuery<'_>,
    engine: &LabelSubstitution<'_>,
) -> Result<Vec<ListingRecord>> {
    let total = count_listings(client, query).await?;
    let requests = page_count(total, query.page_size);
    info!("number_of_requests: {}", requests);

    let mut results = ListingsContainer::default();
    // first request goes out with a blank skiptoken
    let mut skiptoken = String::new();

    for request in 1..=requests {
        let response = client.get(PROPERTY_PATH, &query.page_params(&skiptoken)).await?;
        let page: PageResponse = serde_json::from_value(response)?;

        results.enqueue(engine.apply(page.value));

        match page.next_link {
            Some(next_link) => {
                skiptoken = skiptoken_from_next_link(&next_link)?;
                debug!("skiptoken for next request: {}", skiptoken);
            }
            None if request < requests => {
                warn!(
                    request,
                    requests,
                    "Server returned no next link before the last expected page, stopping"
                );
                break;
            }
            None => debug!("no skiptoken; last request"),
        }
    }

    if (results.len() as u64) != total {
        warn!(expected = total, received = results.len(), "Record count differs from reported total");
    }

    Ok(results.into_records())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockResoApi;
    use crate::metadata::tests::{sample_index, SAMPLE};
    use serde_json::{json, Value};

    fn listings(start: usize, n: usize) -> Vec<Value> {
        (start..start + n)
            .map(|i| json!({ "ListingKey": i.to_string(), "StandardStatus": "Active" }))
            .collect()
    }

    fn page(start: usize, n: usize, next: Option<&str>) -> Value {
        let mut page = json!({ "value": listings(start, n) });
        if let Some(token) = next {
            page["@odata.nextLink"] =
                Value::String(format!("https://example.test/Reso/OData/Property?$top=1000&$skiptoken={}", token));
        }
        page
    }

    fn count_page(count: u64) -> Value {
        json!({ "@odata.count": count, "value": [{ "ListingKey": "0" }] })
    }

    fn query(filter: Option<&str>, page_size: u32) -> ListingQuery<'_> {
        ListingQuery {
            filter,
            page_size,
            expand: "Media,CustomFields",
            count_select: "ListingKey",
        }
    }

    #[tokio::test]
    async fn partial_last_page_needs_an_extra_request() {
        let client = MockResoApi::new(
            SAMPLE,
            vec![
                count_page(2500),
                page(0, 1000, Some("t1")),
                page(1000, 1000, Some("t2")),
                page(2000, 500, None),
            ],
        );
        let index = sample_index();
        let engine = LabelSubstitution::new(&index, "b__");

        let records = fetch_all(&client, &query(None, 1000), &engine).await.unwrap();

        assert_eq!(records.len(), 2500);
        let requests = client.requests();
        assert_eq!(requests.len(), 4);

        let tokens: Vec<_> = requests[1..]
            .iter()
            .map(|(_, q)| MockResoApi::param(q, "$skiptoken").unwrap().to_string())
            .collect();
        assert_eq!(tokens, ["", "t1", "t2"]);

        for (_, q) in &requests[1..] {
            assert_eq!(MockResoApi::param(q, "$top"), Some("1000"));
            assert_eq!(MockResoApi::param(q, "$expand"), Some("Media,CustomFields"));
            assert_eq!(MockResoApi::param(q, "$filter"), None);
        }
    }

    #[tokio::test]
    async fn exact_multiple_does_not_request_an_empty_page() {
        let client = MockResoApi::new(
            SAMPLE,
            vec![count_page(2000), page(0, 1000, Some("t1")), page(1000, 1000, None)],
        );
        let index = sample_index();
        let engine = LabelSubstitution::new(&index, "b__");

        let records = fetch_all(&client, &query(None, 1000), &engine).await.unwrap();

        assert_eq!(records.len(), 2000);
        assert_eq!(client.requests().len(), 3);
    }

    #[tokio::test]
    async fn count_request_carries_filter_and_minimal_projection() {
        let filter = "ModificationTimestamp gt 2019-10-15T11:50:30Z";
        let client = MockResoApi::new(SAMPLE, vec![count_page(3), page(0, 3, None)]);
        let index = sample_index();
        let engine = LabelSubstitution::new(&index, "b__");

        fetch_all(&client, &query(Some(filter), 10), &engine).await.unwrap();

        let requests = client.requests();
        let (path, count_q) = &requests[0];
        assert_eq!(path, PROPERTY_PATH);
        assert_eq!(MockResoApi::param(count_q, "$top"), Some("1"));
        assert_eq!(MockResoApi::param(count_q, "$count"), Some("true"));
        assert_eq!(MockResoApi::param(count_q, "$select"), Some("ListingKey"));
        assert_eq!(MockResoApi::param(count_q, "$filter"), Some(filter));

        let (_, page_q) = &requests[1];
        assert_eq!(MockResoApi::param(page_q, "$top"), Some("10"));
        assert_eq!(MockResoApi::param(page_q, "$filter"), Some(filter));
    }

    #[tokio::test]
    async fn records_are_substituted_and_kept_in_order() {
        let client = MockResoApi::new(
            SAMPLE,
            vec![count_page(4), page(0, 2, Some("t1")), page(2, 2, None)],
        );
        let index = sample_index();
        let engine = LabelSubstitution::new(&index, "b__");

        let records = fetch_all(&client, &query(None, 2), &engine).await.unwrap();

        assert_eq!(
            serde_json::to_value(&records).unwrap(),
            json!([
                { "ListingKey": "0", "StandardStatus": "Active Listing" },
                { "ListingKey": "1", "StandardStatus": "Active Listing" },
                { "ListingKey": "2", "StandardStatus": "Active Listing" },
                { "ListingKey": "3", "StandardStatus": "Active Listing" },
            ])
        );
    }

    #[tokio::test]
    async fn zero_matches_issue_only_the_count_request() {
        let client = MockResoApi::new(SAMPLE, vec![count_page(0)]);
        let index = sample_index();
        let engine = LabelSubstitution::new(&index, "b__");

        let records = fetch_all(&client, &query(None, 1000), &engine).await.unwrap();

        assert!(records.is_empty());
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn missing_next_link_stops_early() {
        let client = MockResoApi::new(SAMPLE, vec![count_page(30), page(0, 10, None)]);
        let index = sample_index();
        let engine = LabelSubstitution::new(&index, "b__");

        let records = fetch_all(&client, &query(None, 10), &engine).await.unwrap();

        assert_eq!(records.len(), 10);
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn count_response_without_total_is_fatal() {
        let client = MockResoApi::new(SAMPLE, vec![json!({ "value": [] })]);
        let index = sample_index();
        let engine = LabelSubstitution::new(&index, "b__");

        let err = fetch_all(&client, &query(None, 10), &engine).await.unwrap_err();
        assert!(matches!(err, Error::MissingCount));
    }

    #[tokio::test]
    async fn malformed_page_is_fatal() {
        let client = MockResoApi::new(SAMPLE, vec![count_page(1), json!({ "error": "boom" })]);
        let index = sample_index();
        let engine = LabelSubstitution::new(&index, "b__");

        let err = fetch_all(&client, &query(None, 10), &engine).await.unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[tokio::test]
    async fn metadata_is_fetched_from_metadata_path() {
        let client = MockResoApi::new(SAMPLE, vec![]);
        let index = fetch_metadata(&client).await.unwrap();

        assert_eq!(index.enum_label("StandardStatus", "Active"), Some("Active Listing"));
        assert_eq!(client.requests()[0].0, METADATA_PATH);
    }
}
