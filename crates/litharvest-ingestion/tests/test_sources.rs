//! Source adapters against a local mock server.

use litharvest_common::http::{CourtesyDelay, HttpSettings, RateLimitedClient};
use litharvest_common::retry::RetryPolicy;
use litharvest_common::SourceTag;
use litharvest_ingestion::sources::listing::GOOGLE_SCHOLAR;
use litharvest_ingestion::sources::{
    collect_raw, fetch_records, ArxivAdapter, EntrezAdapter, EntrezDb, ListingAdapter, OpenAlexAdapter,
    ScilitAdapter, SourceAdapter, VecSink,
};
use mockito::{Matcher, Server};
use serde_json::json;
use std::time::Duration;

fn client() -> RateLimitedClient {
    RateLimitedClient::new(HttpSettings {
        courtesy: CourtesyDelay::none(),
        retry: RetryPolicy::new(2, Duration::from_millis(5)),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn ids(range: std::ops::RangeInclusive<u32>) -> String {
    range.map(|i| i.to_string()).collect::<Vec<_>>().join(",")
}

fn pubmed_set(range: std::ops::RangeInclusive<u32>) -> String {
    let articles: String = range
        .map(|i| {
            format!(
                "<PubmedArticle><MedlineCitation><PMID>{i}</PMID><Article>\
                 <ArticleTitle>Article {i}</ArticleTitle>\
                 <Journal><JournalIssue><PubDate><Year>2020</Year></PubDate></JournalIssue></Journal>\
                 </Article></MedlineCitation></PubmedArticle>"
            )
        })
        .collect();
    format!("<?xml version=\"1.0\"?>\n<PubmedArticleSet>{articles}</PubmedArticleSet>")
}

#[tokio::test]
async fn test_entrez_fetches_ids_in_batches_of_100() {
    let mut server = Server::new_async().await;

    let id_list: String = (1..=250).map(|i| format!("<Id>{i}</Id>")).collect();
    let esearch = server
        .mock("GET", "/esearch.fcgi")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("db".into(), "pubmed".into()),
            Matcher::UrlEncoded("term".into(), "wetland methane".into()),
            Matcher::UrlEncoded("retmax".into(), "250".into()),
        ]))
        .with_body(format!("<eSearchResult><Count>250</Count><IdList>{id_list}</IdList></eSearchResult>"))
        .expect(1)
        .create_async()
        .await;

    let mut efetch = Vec::new();
    for range in [1..=100, 101..=200, 201..=250] {
        let mock = server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), ids(range.clone())),
                Matcher::UrlEncoded("retmode".into(), "xml".into()),
            ]))
            .with_body(pubmed_set(range))
            .expect(1)
            .create_async()
            .await;
        efetch.push(mock);
    }

    let adapter = EntrezAdapter::new(client(), EntrezDb::PubMed)
        .with_base_url(server.url())
        .with_batch_size(100);
    let mut sink = VecSink::default();
    adapter.fetch("wetland methane", 250, &mut sink).await;

    esearch.assert_async().await;
    for mock in &efetch {
        mock.assert_async().await;
    }
    assert_eq!(sink.batches, 3);
    assert_eq!(sink.failed_batches, 0);
    assert_eq!(sink.items.len(), 250);

    let record = adapter.normalise(sink.items.remove(0)).unwrap();
    assert_eq!(record.title, "Article 1");
    assert_eq!(record.year, Some(2020));
    assert_eq!(record.source, SourceTag::PubMed);
}

#[tokio::test]
async fn test_entrez_failed_batch_does_not_stop_the_rest() {
    let mut server = Server::new_async().await;
    let id_list: String = (1..=4).map(|i| format!("<Id>{i}</Id>")).collect();
    server
        .mock("GET", "/esearch.fcgi")
        .match_query(Matcher::Any)
        .with_body(format!("<eSearchResult><IdList>{id_list}</IdList></eSearchResult>"))
        .create_async()
        .await;
    server
        .mock("GET", "/efetch.fcgi")
        .match_query(Matcher::UrlEncoded("id".into(), "1,2".into()))
        .with_status(500)
        .create_async()
        .await;
    server
        .mock("GET", "/efetch.fcgi")
        .match_query(Matcher::UrlEncoded("id".into(), "3,4".into()))
        .with_body(pubmed_set(3..=4))
        .create_async()
        .await;

    let adapter = EntrezAdapter::new(client(), EntrezDb::PubMed)
        .with_base_url(server.url())
        .with_batch_size(2);
    let mut sink = VecSink::default();
    adapter.fetch("q", 10, &mut sink).await;

    assert_eq!(sink.failed_batches, 1);
    assert_eq!(sink.items.len(), 2);
}

#[tokio::test]
async fn test_openalex_single_page_when_max_below_page_size() {
    let mut server = Server::new_async().await;
    let works: Vec<_> = (0..200).map(|i| json!({"title": format!("Work {i}")})).collect();
    let mock = server
        .mock("GET", "/works")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("filter".into(), "title.search:peatland".into()),
            Matcher::UrlEncoded("per_page".into(), "200".into()),
            Matcher::UrlEncoded("page".into(), "1".into()),
        ]))
        .with_body(json!({ "results": works }).to_string())
        .expect(1)
        .create_async()
        .await;

    let adapter = OpenAlexAdapter::new(client(), None)
        .with_base_url(format!("{}/works", server.url()))
        .with_page_size(200);
    let batch = fetch_records(&adapter, "peatland", 150).await;

    mock.assert_async().await;
    assert_eq!(batch.records.len(), 150);
    assert_eq!(batch.failures, 0);
}

#[tokio::test]
async fn test_openalex_stops_on_empty_page() {
    let mut server = Server::new_async().await;
    let page1: Vec<_> = (0..2).map(|i| json!({"title": format!("W{i}")})).collect();
    server
        .mock("GET", "/works")
        .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
        .with_body(json!({ "results": page1 }).to_string())
        .create_async()
        .await;
    let page2 = server
        .mock("GET", "/works")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .with_body(json!({ "results": [] }).to_string())
        .expect(1)
        .create_async()
        .await;
    let page3 = server
        .mock("GET", "/works")
        .match_query(Matcher::UrlEncoded("page".into(), "3".into()))
        .expect(0)
        .create_async()
        .await;

    let adapter = OpenAlexAdapter::new(client(), Some("ops@example.org".into()))
        .with_base_url(format!("{}/works", server.url()))
        .with_page_size(2);
    let items = collect_raw(&adapter, "q", 10).await;

    assert_eq!(items.len(), 2);
    page2.assert_async().await;
    page3.assert_async().await;
}

#[tokio::test]
async fn test_arxiv_bad_entry_is_skipped_alone() {
    let mut server = Server::new_async().await;
    let entries: String = (1..=10)
        .map(|i| {
            let published = if i == 5 { "n.d." } else { "2022-03-01T00:00:00Z" };
            format!(
                "<entry><id>http://arxiv.org/abs/{i}</id><title>Entry {i}</title>\
                 <published>{published}</published><summary>s</summary></entry>"
            )
        })
        .collect();
    server
        .mock("GET", "/api/query")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("search_query".into(), "all:tundra".into()),
            Matcher::UrlEncoded("max_results".into(), "10".into()),
        ]))
        .with_body(format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <feed xmlns=\"http://www.w3.org/2005/Atom\">{entries}</feed>"
        ))
        .create_async()
        .await;

    let adapter = ArxivAdapter::new(client()).with_base_url(format!("{}/api/query", server.url()));
    let batch = fetch_records(&adapter, "all:tundra", 10).await;

    assert_eq!(batch.records.len(), 9);
    assert_eq!(batch.failures, 1);
    assert!(batch.records.iter().all(|r| r.title != "Entry 5"));
}

#[tokio::test]
async fn test_arxiv_mismatched_close_tag_fails_only_its_entry() {
    let mut server = Server::new_async().await;
    let entries: String = (1..=10)
        .map(|i| {
            let close = if i == 5 { "titel" } else { "title" };
            format!("<entry><id>http://arxiv.org/abs/{i}</id><title>Entry {i}</{close}></entry>")
        })
        .collect();
    server
        .mock("GET", "/api/query")
        .match_query(Matcher::Any)
        .with_body(format!("<feed xmlns=\"http://www.w3.org/2005/Atom\">{entries}</feed>"))
        .create_async()
        .await;

    let adapter = ArxivAdapter::new(client()).with_base_url(format!("{}/api/query", server.url()));
    let batch = fetch_records(&adapter, "all:tundra", 10).await;

    assert_eq!(batch.records.len(), 9);
    assert_eq!(batch.failures, 1);
    assert!(batch.records.iter().any(|r| r.title == "Entry 6"));
}

#[tokio::test]
async fn test_entrez_mismatched_close_tag_fails_only_its_article() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/esearch.fcgi")
        .match_query(Matcher::Any)
        .with_body("<eSearchResult><IdList><Id>1</Id><Id>2</Id><Id>3</Id></IdList></eSearchResult>")
        .create_async()
        .await;
    let body = pubmed_set(1..=3).replace(
        "<ArticleTitle>Article 2</ArticleTitle>",
        "<ArticleTitle>Article 2</ArticleTitel>",
    );
    server
        .mock("GET", "/efetch.fcgi")
        .match_query(Matcher::Any)
        .with_body(body)
        .create_async()
        .await;

    let adapter = EntrezAdapter::new(client(), EntrezDb::PubMed).with_base_url(server.url());
    let mut sink = VecSink::default();
    adapter.fetch("q", 3, &mut sink).await;

    assert_eq!(sink.failed_batches, 0);
    assert_eq!(sink.items.len(), 3);

    let results: Vec<_> = sink.items.into_iter().map(|item| adapter.normalise(item)).collect();
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert_eq!(results[2].as_ref().unwrap().title, "Article 3");
}

#[tokio::test]
async fn test_scilit_request_failure_is_empty_batch() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/search")
        .match_query(Matcher::Any)
        .with_status(429)
        .expect(2)
        .create_async()
        .await;

    let adapter = ScilitAdapter::new(client()).with_base_url(format!("{}/search", server.url()));
    let mut sink = VecSink::default();
    adapter.fetch("q", 5, &mut sink).await;

    assert!(sink.items.is_empty());
    assert_eq!(sink.failed_batches, 1);
}

fn scholar_page(from: usize, n: usize) -> String {
    let results: String = (from..from + n)
        .map(|i| {
            format!(
                "<div class=\"gs_r\"><div class=\"gs_ri\">\
                 <h3><a href=\"/paper/{i}\">Paper {i}</a></h3>\
                 <div class=\"gs_a\">A Author - Ecology, 2015 - example.org</div>\
                 </div></div>"
            )
        })
        .collect();
    format!("<html><body>{results}</body></html>")
}

#[tokio::test]
async fn test_listing_offset_paging() {
    let mut server = Server::new_async().await;
    let mut pages = Vec::new();
    for start in [0usize, 10, 20] {
        let mock = server
            .mock("GET", "/scholar")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "fen".into()),
                Matcher::UrlEncoded("start".into(), start.to_string()),
            ]))
            .with_body(scholar_page(start, 10))
            .expect(1)
            .create_async()
            .await;
        pages.push(mock);
    }

    let base = format!("{}/scholar", server.url());
    let adapter = ListingAdapter::new(client(), &GOOGLE_SCHOLAR).unwrap().with_base_url(base.clone());
    let batch = fetch_records(&adapter, "fen", 25).await;

    for mock in &pages {
        mock.assert_async().await;
    }
    assert_eq!(batch.records.len(), 25);
    let first = &batch.records[0];
    assert_eq!(first.title, "Paper 0");
    assert_eq!(first.year, Some(2015));
    assert_eq!(first.journal, "Ecology");
    assert_eq!(first.link, format!("{}/paper/0", server.url()));
}
